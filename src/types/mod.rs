//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Accounts, balance kinds, and balance adjustments
//! - `transaction`: Ledger records, their lifecycle, patches, and filters
//! - `error`: Error types for the ledger

pub mod account;
pub mod error;
pub mod transaction;

pub use account::{Account, AccountId, BalanceAdjustment, BalanceKind};
pub use error::{ErrorCategory, LedgerError, Leg};
pub use transaction::{
    ConversionDirection, NewTransaction, Party, Transaction, TransactionFilter, TransactionId,
    TransactionKind, TransactionPatch, TransactionStatus,
};
