//! Error types for the escrow ledger
//!
//! This module defines every error a ledger operation can report. Errors are
//! descriptive enough to show to a user (business rules), to retry on
//! (infrastructure), or to reconcile by hand (consistency violations).
//!
//! # Error Categories
//!
//! - **Business rules**: invalid amount, unknown recipient or transaction,
//!   insufficient funds, invalid state transition. Detected before any mutation.
//! - **Infrastructure**: store unavailable or timed out. Safe for the caller to retry.
//! - **Consistency**: a compensation failed and the ledger may be unbalanced.
//!   Should never happen in a correct deployment.

use super::account::{AccountId, BalanceKind};
use super::transaction::{TransactionId, TransactionStatus};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Show an actionable message; retrying the same request will fail again
    BusinessRule,
    /// Transient failure; "try again"
    Infrastructure,
    /// The ledger may need manual reconciliation
    Consistency,
}

/// A balance mutation that was durably applied
///
/// Carried by `ConsistencyViolation` so an operator knows which legs to reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leg {
    pub account: AccountId,
    pub kind: BalanceKind,
    pub delta: Decimal,
}

impl Leg {
    pub fn new(account: AccountId, kind: BalanceKind, delta: Decimal) -> Self {
        Leg {
            account,
            kind,
            delta,
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:+} on account {}", self.kind, self.delta, self.account)
    }
}

fn describe_legs(legs: &[Leg]) -> String {
    if legs.is_empty() {
        return "none".to_string();
    }
    legs.iter()
        .map(|leg| leg.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount is zero or negative
    #[error("Invalid amount {amount}: amounts must be positive")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// No account is registered under the identifier the caller typed
    #[error("Recipient '{identifier}' not found")]
    RecipientNotFound {
        /// The identifier that failed to resolve
        identifier: String,
    },

    /// The acting account does not exist
    #[error("Account {account} not found")]
    AccountNotFound {
        /// Account ID
        account: AccountId,
    },

    /// No ledger record with this id
    #[error("Transaction {tx} not found")]
    TransactionNotFound {
        /// Transaction ID
        tx: TransactionId,
    },

    /// A balance would go negative
    #[error("Insufficient {kind} for account {account}: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Account ID
        account: AccountId,
        /// Balance that is short
        kind: BalanceKind,
        /// Balance at the time of the check
        available: Decimal,
        /// Amount that was requested
        requested: Decimal,
    },

    /// State-machine transition attempted from a non-eligible state
    ///
    /// Covers duplicate rejection, approval of a settled record, and any
    /// transition on a kind without a pending phase.
    #[error("Cannot {operation} transaction {tx} in status {status}")]
    InvalidState {
        /// Transaction ID
        tx: TransactionId,
        /// Status observed when the transition was attempted
        status: TransactionStatus,
        /// Operation that was refused
        operation: String,
    },

    /// The acting account is neither sender nor receiver
    #[error("Account {account} is not a party to transaction {tx}")]
    NotParticipant {
        /// Transaction ID
        tx: TransactionId,
        /// Acting account
        account: AccountId,
    },

    /// Sender and receiver resolve to the same account
    #[error("Account {account} cannot {operation} to itself")]
    SelfTransfer {
        /// Account ID
        account: AccountId,
        /// Operation that was refused
        operation: String,
    },

    /// A balance would exceed the decimal range
    #[error("Arithmetic overflow on {kind} for account {account}")]
    ArithmeticOverflow {
        /// Account ID
        account: AccountId,
        /// Balance that would overflow
        kind: BalanceKind,
    },

    /// The store could not be reached; safe to retry
    #[error("Ledger store unavailable: {message}")]
    StoreUnavailable {
        /// Description from the store
        message: String,
    },

    /// A store call did not complete within the configured bound; safe to retry
    #[error("Ledger store timed out during {operation}")]
    Timeout {
        /// Store operation that timed out
        operation: String,
    },

    /// A multi-leg operation could not be completed or compensated
    ///
    /// The ledger may be unbalanced; `legs` lists mutations that remain applied.
    #[error(
        "Consistency violation in {operation}{}: {cause}; applied legs: {}",
        tx.map(|t| format!(" for transaction {}", t)).unwrap_or_default(),
        describe_legs(legs)
    )]
    ConsistencyViolation {
        /// Operation that was in flight
        operation: String,
        /// Transaction ID, if a record was involved
        tx: Option<TransactionId>,
        /// Balance mutations that remain applied
        legs: Vec<Leg>,
        /// The failure that could not be compensated
        cause: String,
    },

    /// I/O error while reading commands or writing output
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    /// Classify the error for caller-facing handling
    pub fn category(&self) -> ErrorCategory {
        match self {
            LedgerError::StoreUnavailable { .. }
            | LedgerError::Timeout { .. }
            | LedgerError::IoError { .. } => ErrorCategory::Infrastructure,
            LedgerError::ConsistencyViolation { .. } => ErrorCategory::Consistency,
            _ => ErrorCategory::BusinessRule,
        }
    }

    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create a RecipientNotFound error
    pub fn recipient_not_found(identifier: &str) -> Self {
        LedgerError::RecipientNotFound {
            identifier: identifier.to_string(),
        }
    }

    /// Create an AccountNotFound error
    pub fn account_not_found(account: AccountId) -> Self {
        LedgerError::AccountNotFound { account }
    }

    /// Create a TransactionNotFound error
    pub fn transaction_not_found(tx: TransactionId) -> Self {
        LedgerError::TransactionNotFound { tx }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(
        account: AccountId,
        kind: BalanceKind,
        available: Decimal,
        requested: Decimal,
    ) -> Self {
        LedgerError::InsufficientFunds {
            account,
            kind,
            available,
            requested,
        }
    }

    /// Create an InvalidState error
    pub fn invalid_state(tx: TransactionId, status: TransactionStatus, operation: &str) -> Self {
        LedgerError::InvalidState {
            tx,
            status,
            operation: operation.to_string(),
        }
    }

    /// Create a NotParticipant error
    pub fn not_participant(tx: TransactionId, account: AccountId) -> Self {
        LedgerError::NotParticipant { tx, account }
    }

    /// Create a SelfTransfer error
    pub fn self_transfer(account: AccountId, operation: &str) -> Self {
        LedgerError::SelfTransfer {
            account,
            operation: operation.to_string(),
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(account: AccountId, kind: BalanceKind) -> Self {
        LedgerError::ArithmeticOverflow { account, kind }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: &str) -> Self {
        LedgerError::StoreUnavailable {
            message: message.to_string(),
        }
    }

    /// Create a Timeout error
    pub fn timeout(operation: &str) -> Self {
        LedgerError::Timeout {
            operation: operation.to_string(),
        }
    }

    /// Create a ConsistencyViolation error
    pub fn consistency_violation(
        operation: &str,
        tx: Option<TransactionId>,
        legs: Vec<Leg>,
        cause: impl ToString,
    ) -> Self {
        LedgerError::ConsistencyViolation {
            operation: operation.to_string(),
            tx,
            legs,
            cause: cause.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_amount(
        LedgerError::InvalidAmount { amount: Decimal::new(-5, 0) },
        "Invalid amount -5: amounts must be positive"
    )]
    #[case::recipient_not_found(
        LedgerError::recipient_not_found("nobody@example.com"),
        "Recipient 'nobody@example.com' not found"
    )]
    #[case::transaction_not_found(
        LedgerError::transaction_not_found(99),
        "Transaction 99 not found"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(1, BalanceKind::Coins, Decimal::new(5, 0), Decimal::new(20, 0)),
        "Insufficient coins for account 1: available 5, requested 20"
    )]
    #[case::invalid_state(
        LedgerError::invalid_state(3, TransactionStatus::Rejected, "reject"),
        "Cannot reject transaction 3 in status rejected"
    )]
    #[case::not_participant(
        LedgerError::not_participant(3, 9),
        "Account 9 is not a party to transaction 3"
    )]
    #[case::self_transfer(
        LedgerError::self_transfer(4, "send"),
        "Account 4 cannot send to itself"
    )]
    #[case::timeout(
        LedgerError::timeout("adjust_balance"),
        "Ledger store timed out during adjust_balance"
    )]
    #[case::parse_error_with_line(
        LedgerError::ParseError { line: Some(42), message: "Invalid field".to_string() },
        "CSV parse error at line 42: Invalid field"
    )]
    #[case::consistency_violation(
        LedgerError::ConsistencyViolation {
            operation: "send".to_string(),
            tx: None,
            legs: vec![Leg::new(1, BalanceKind::Cash, Decimal::new(-40, 0))],
            cause: "Ledger store unavailable: down".to_string(),
        },
        "Consistency violation in send: Ledger store unavailable: down; applied legs: cash -40 on account 1"
    )]
    #[case::consistency_violation_with_tx(
        LedgerError::ConsistencyViolation {
            operation: "buy".to_string(),
            tx: Some(7),
            legs: vec![],
            cause: "boom".to_string(),
        },
        "Consistency violation in buy for transaction 7: boom; applied legs: none"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::business(LedgerError::invalid_amount(Decimal::ZERO), ErrorCategory::BusinessRule, false)]
    #[case::funds(
        LedgerError::insufficient_funds(1, BalanceKind::Cash, Decimal::ZERO, Decimal::ONE),
        ErrorCategory::BusinessRule,
        false
    )]
    #[case::unavailable(LedgerError::store_unavailable("down"), ErrorCategory::Infrastructure, true)]
    #[case::timeout(LedgerError::timeout("get_account"), ErrorCategory::Infrastructure, true)]
    #[case::consistency(
        LedgerError::consistency_violation("send", None, vec![], &LedgerError::store_unavailable("down")),
        ErrorCategory::Consistency,
        false
    )]
    fn test_error_category(
        #[case] error: LedgerError,
        #[case] category: ErrorCategory,
        #[case] retryable: bool,
    ) {
        assert_eq!(error.category(), category);
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
