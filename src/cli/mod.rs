// CLI module
// Argument parsing and logger setup

mod args;

pub use args::CliArgs;

use clap::Parser;
use log::{LevelFilter, SetLoggerError};
use simple_logger::SimpleLogger;

/// Parse command-line arguments using clap
///
/// On invalid arguments or `--help`, clap prints the message and exits.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Install the stderr logger at `level`; `RUST_LOG` overrides it when set
pub fn init_logging(level: LevelFilter) -> Result<(), SetLoggerError> {
    SimpleLogger::new().with_level(level).env().init()
}
