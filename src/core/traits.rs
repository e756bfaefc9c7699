//! Core traits for ledger storage and identity resolution
//!
//! These are the seams to the external collaborators. The ledger components
//! only rely on the guarantees documented here, so a relational store can stand
//! in for the in-memory one as long as it provides the same per-row atomicity.

use async_trait::async_trait;

use crate::types::{
    Account, AccountId, BalanceAdjustment, LedgerError, NewTransaction, Transaction,
    TransactionFilter, TransactionId, TransactionPatch,
};

/// Durable storage of accounts and ledger records
///
/// # Guarantees required by the ledger
///
/// - `adjust_balance` is a single atomic read-modify-write on one account row,
///   evaluated against the latest committed balances. It fails with
///   `InsufficientFunds` and mutates nothing if any resulting balance would be
///   negative.
/// - `update_transaction` evaluates the patch's status guard and applies the
///   patch as one conditional update on the record.
/// - `update_transaction_with_adjustment` commits the patch and the balance
///   adjustment together or neither of them.
/// - A successful return means the mutation is visible to every later read.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Read an account by id
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// All accounts, in no particular order
    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError>;

    /// Atomically adjust one account's balances and return the new snapshot
    async fn adjust_balance(
        &self,
        id: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<Account, LedgerError>;

    /// Append a new record and return it with its assigned id
    async fn insert_transaction(&self, record: NewTransaction) -> Result<Transaction, LedgerError>;

    /// Read a record by id
    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError>;

    /// Apply a conditional patch and return the updated record
    async fn update_transaction(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, LedgerError>;

    /// Apply a conditional patch and a balance adjustment as one atomic unit
    async fn update_transaction_with_adjustment(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
        account: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<(Transaction, Account), LedgerError>;

    /// Records matching `filter`, in no particular order
    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError>;
}

/// Turns a user-supplied identifier (email/phone) into an account id
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_account(&self, identifier: &str) -> Result<Option<AccountId>, LedgerError>;
}
