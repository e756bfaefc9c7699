//! Escrow ledger CLI
//!
//! Replays a CSV of ledger commands and prints the final balances.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- commands.csv > accounts.csv
//! cargo run -- --transactions transactions.csv commands.csv > accounts.csv
//! cargo run -- --batch-size 500 --workers 4 --log-level info commands.csv > accounts.csv
//! ```
//!
//! Balances go to stdout as `account,identifier,cash,coins`. Logs go to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success (individual commands may still have been rejected)
//! - 1: Error (missing arguments, unreadable input, unwritable output)

use escrow_ledger::{cli, replay};
use std::process;

fn main() {
    let args = cli::parse_args();

    if let Err(e) = cli::init_logging(args.log_level) {
        eprintln!("Error: failed to initialise logging: {}", e);
        process::exit(1);
    }

    let config = args.to_replay_config();
    let mut output = std::io::stdout();
    if let Err(e) = replay::replay(
        &config,
        &args.input_file,
        &mut output,
        args.transactions.as_deref(),
    ) {
        log::error!("{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
