//! I/O module
//!
//! Handles the command CSV input and report output.
//!
//! # Components
//!
//! - `csv_format` - Command records, validation and report serialization
//! - `async_reader` - Asynchronous batch reader over command files

pub mod async_reader;
pub mod csv_format;

pub use async_reader::AsyncReader;
pub use csv_format::{
    convert_command_record, write_accounts_csv, write_transactions_csv, CommandRecord,
    LedgerCommand,
};
