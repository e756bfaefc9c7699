//! End-to-end integration tests
//!
//! Each fixture under tests/fixtures/<name>/ holds an `input.csv` of ledger
//! commands and the `expected.csv` balances the replay must print. Fixtures
//! cover:
//! - Escrow settlement and rejection
//! - Direct transfers and conversions
//! - Business-rule rejections (insufficient funds, unknown references)
//! - Duplicate approvals and malformed rows
//! - Output precision
//!
//! Every fixture runs with a one-command batch and with the default batch size.

#[cfg(test)]
mod tests {
    use escrow_ledger::replay::{replay, ReplayConfig};
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn config(batch_size: usize) -> ReplayConfig {
        ReplayConfig::new(batch_size, 2, Duration::from_secs(5))
    }

    /// Replay `input.csv` of a fixture and compare stdout with `expected.csv`
    fn run_test_fixture(fixture_name: &str, batch_size: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");

        replay(
            &config(batch_size),
            Path::new(&input_path),
            &mut temp_output,
            None,
        )
        .unwrap_or_else(|e| panic!("Failed to replay commands: {}", e));

        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (batch size: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, batch_size, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("escrow_settlement")]
    #[case("escrow_rejection")]
    #[case("direct_transfers")]
    #[case("conversions")]
    #[case("insufficient_funds")]
    #[case("invalid_references")]
    #[case("duplicate_approvals")]
    #[case("malformed_data")]
    #[case("precision")]
    fn test_fixtures(#[case] fixture: &str, #[values(1, 1000)] batch_size: usize) {
        run_test_fixture(fixture, batch_size);
    }

    #[test]
    fn test_transaction_log_output() {
        let transactions = NamedTempFile::new().expect("Failed to create temp file");
        let mut balances = Vec::new();

        replay(
            &config(1000),
            Path::new("tests/fixtures/escrow_rejection/input.csv"),
            &mut balances,
            Some(transactions.path()),
        )
        .unwrap_or_else(|e| panic!("Failed to replay commands: {}", e));

        let actual = fs::read_to_string(transactions.path()).unwrap();
        let expected =
            fs::read_to_string("tests/fixtures/escrow_rejection/transactions.csv").unwrap();
        assert_eq!(actual, expected);
    }
}
