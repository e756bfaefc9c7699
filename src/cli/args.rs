use crate::replay::ReplayConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Replay escrow ledger commands and report final balances
#[derive(Parser, Debug)]
#[command(name = "escrow-ledger")]
#[command(about = "Replay escrow ledger commands and report final balances", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger commands
    #[arg(value_name = "INPUT", help = "Path to the command CSV file")]
    pub input_file: PathBuf,

    /// Optional transaction log output
    #[arg(
        long = "transactions",
        value_name = "PATH",
        help = "Also write every transaction record to this CSV file"
    )]
    pub transactions: Option<PathBuf>,

    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands read per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,

    #[arg(
        long = "store-timeout-ms",
        value_name = "MILLIS",
        help = "Deadline for each store call in milliseconds (default: 5000)"
    )]
    pub store_timeout_ms: Option<u64>,

    /// Log verbosity; RUST_LOG takes precedence when set
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        default_value = "warn",
        help = "Log level: error, warn, info, debug or trace"
    )]
    pub log_level: log::LevelFilter,
}

impl CliArgs {
    /// Build a ReplayConfig, falling back to defaults for anything not given
    pub fn to_replay_config(&self) -> ReplayConfig {
        let default = ReplayConfig::default();
        ReplayConfig::new(
            self.batch_size.unwrap_or(default.batch_size),
            self.workers.unwrap_or(default.workers),
            self.store_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.store_timeout),
        )
    }
}
