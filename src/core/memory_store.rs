//! Thread-safe in-memory ledger store
//!
//! This module provides `InMemoryLedgerStore`, a `LedgerStore` and
//! `IdentityResolver` backed by concurrent maps.
//!
//! # Design
//!
//! The store uses `DashMap` (a concurrent HashMap) for accounts, ledger records
//! and the identifier directory. Every mutation runs while holding the entry
//! for the row it changes, which gives the per-row atomicity the ledger relies
//! on: the sufficient-funds check and the write of a balance adjustment happen
//! under the same lock, as do the status guard and the write of a patch.
//!
//! # Lock Ordering
//!
//! `update_transaction_with_adjustment` holds a record entry while it takes an
//! account entry. No operation takes an account entry and then a record entry,
//! so the two maps can never deadlock against each other.
//!
//! # Thread Safety
//!
//! None of the async methods suspend while holding an entry; each completes on
//! its first poll.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{IdentityResolver, LedgerStore};
use crate::types::{
    Account, AccountId, BalanceAdjustment, LedgerError, NewTransaction, Transaction,
    TransactionFilter, TransactionId, TransactionPatch,
};

/// Thread-safe in-memory ledger store
///
/// Multiple tasks can safely access different rows simultaneously, while
/// operations on the same row are serialized by the map's shard locks.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    /// Account rows by id
    accounts: DashMap<AccountId, Account>,

    /// Identifier (email/phone) to account id
    directory: DashMap<String, AccountId>,

    /// Append-only ledger records by id
    transactions: DashMap<TransactionId, Transaction>,

    /// Next id handed out by `insert_transaction`
    next_transaction_id: AtomicU64,
}

impl InMemoryLedgerStore {
    /// Create an empty store; the first inserted record gets id 1
    pub fn new() -> Self {
        Self {
            accounts: DashMap::new(),
            directory: DashMap::new(),
            transactions: DashMap::new(),
            next_transaction_id: AtomicU64::new(1),
        }
    }

    /// Onboard an account with zero balances
    ///
    /// Opening an id that already exists returns the existing account
    /// unchanged. The identifier is registered for `id` unless another account
    /// already claimed it (first registration wins).
    pub fn open_account(&self, id: AccountId, identifier: &str) -> Account {
        let identifier = identifier.trim();
        let account = self
            .accounts
            .entry(id)
            .or_insert_with(|| Account::new(id, identifier))
            .clone();

        let owner = *self
            .directory
            .entry(account.identifier.clone())
            .or_insert(account.id);
        if owner != account.id {
            log::warn!(
                "Identifier {} already belongs to account {}; account {} cannot be reached by it",
                account.identifier,
                owner,
                account.id
            );
        }

        account
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(self.accounts.get(&id).map(|entry| entry.value().clone()))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self
            .accounts
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn adjust_balance(
        &self,
        id: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<Account, LedgerError> {
        let mut entry = self
            .accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::account_not_found(id))?;

        adjustment.apply(entry.value_mut())?;

        Ok(entry.value().clone())
    }

    async fn insert_transaction(&self, record: NewTransaction) -> Result<Transaction, LedgerError> {
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let transaction = Transaction::from_new(id, record);

        self.transactions.insert(id, transaction.clone());

        Ok(transaction)
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.transactions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_transaction(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
    ) -> Result<Transaction, LedgerError> {
        let mut entry = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::transaction_not_found(id))?;

        patch.apply(entry.value_mut())?;

        Ok(entry.value().clone())
    }

    async fn update_transaction_with_adjustment(
        &self,
        id: TransactionId,
        patch: TransactionPatch,
        account: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<(Transaction, Account), LedgerError> {
        let mut tx_entry = self
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LedgerError::transaction_not_found(id))?;

        patch.check(tx_entry.value())?;

        let mut account_entry = self
            .accounts
            .get_mut(&account)
            .ok_or_else(|| LedgerError::account_not_found(account))?;

        adjustment.apply(account_entry.value_mut())?;
        patch.apply(tx_entry.value_mut())?;

        Ok((tx_entry.value().clone(), account_entry.value().clone()))
    }

    async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self
            .transactions
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[async_trait]
impl IdentityResolver for InMemoryLedgerStore {
    async fn resolve_account(&self, identifier: &str) -> Result<Option<AccountId>, LedgerError> {
        Ok(self.directory.get(identifier.trim()).map(|entry| *entry.value()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BalanceKind, Party, TransactionKind, TransactionStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn escrow_record(sender: AccountId, receiver: AccountId, amount: i64) -> NewTransaction {
        NewTransaction {
            sender,
            receiver,
            counterparty_hint: None,
            kind: TransactionKind::EscrowBuy,
            amount: Decimal::new(amount, 0),
            currency: BalanceKind::Coins,
            status: TransactionStatus::Pending,
            description: "Order".to_string(),
            created_at: Utc::now(),
        }
    }

    async fn funded_store(cash: i64, coins: i64) -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store.open_account(1, "alice@example.com");
        store.open_account(2, "bob@example.com");
        store
            .adjust_balance(
                1,
                BalanceAdjustment {
                    cash: Decimal::new(cash, 0),
                    coins: Decimal::new(coins, 0),
                },
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_open_account_is_idempotent() {
        let store = InMemoryLedgerStore::new();

        let first = store.open_account(1, " alice@example.com ");
        store.adjust_balance(1, BalanceAdjustment::single(BalanceKind::Cash, Decimal::TEN))
            .await
            .unwrap();
        let second = store.open_account(1, "other@example.com");

        assert_eq!(first.identifier, "alice@example.com");
        assert_eq!(second.cash, Decimal::TEN);
        assert_eq!(second.identifier, "alice@example.com");
    }

    #[tokio::test]
    async fn test_resolve_account_by_identifier() {
        let store = InMemoryLedgerStore::new();
        store.open_account(1, "alice@example.com");
        store.open_account(2, "alice@example.com");

        assert_eq!(store.resolve_account("alice@example.com").await.unwrap(), Some(1));
        assert_eq!(store.resolve_account(" alice@example.com").await.unwrap(), Some(1));
        assert_eq!(store.resolve_account("carol@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_conflicting_identifier_keeps_first_owner() {
        let store = InMemoryLedgerStore::new();
        store.open_account(1, "alice@example.com");

        let second = store.open_account(2, "alice@example.com");

        assert_eq!(second.id, 2);
        assert!(store.get_account(2).await.unwrap().is_some());
        assert_eq!(store.resolve_account("alice@example.com").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_adjust_balance_returns_snapshot() {
        let store = funded_store(100, 0).await;

        let account = store
            .adjust_balance(1, BalanceAdjustment::single(BalanceKind::Cash, Decimal::new(-40, 0)))
            .await
            .unwrap();

        assert_eq!(account.cash, Decimal::new(60, 0));
        assert_eq!(store.get_account(1).await.unwrap().unwrap().cash, Decimal::new(60, 0));
    }

    #[tokio::test]
    async fn test_adjust_balance_unknown_account() {
        let store = InMemoryLedgerStore::new();

        let result = store
            .adjust_balance(9, BalanceAdjustment::single(BalanceKind::Cash, Decimal::ONE))
            .await;

        assert_eq!(result, Err(LedgerError::account_not_found(9)));
    }

    #[tokio::test]
    async fn test_adjust_balance_overdraft_leaves_row_unchanged() {
        let store = funded_store(10, 0).await;

        let result = store
            .adjust_balance(1, BalanceAdjustment::single(BalanceKind::Cash, Decimal::new(-11, 0)))
            .await;

        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(store.get_account(1).await.unwrap().unwrap().cash, Decimal::TEN);
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let store = funded_store(0, 0).await;

        let first = store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();
        let second = store.insert_transaction(escrow_record(1, 2, 6)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(!first.sender_approved && !first.receiver_approved);
        assert_eq!(store.get_transaction(2).await.unwrap().unwrap().amount, Decimal::new(6, 0));
        assert_eq!(store.get_transaction(3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_transaction_applies_conditional_patch() {
        let store = funded_store(0, 0).await;
        let tx = store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();

        let updated = store
            .update_transaction(tx.id, TransactionPatch::approve(Party::Receiver))
            .await
            .unwrap();

        assert!(updated.receiver_approved);
        assert_eq!(updated.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_missing_transaction() {
        let store = InMemoryLedgerStore::new();

        let result = store
            .update_transaction(42, TransactionPatch::approve(Party::Sender))
            .await;

        assert_eq!(result, Err(LedgerError::transaction_not_found(42)));
    }

    #[tokio::test]
    async fn test_update_with_adjustment_commits_both() {
        let store = funded_store(0, 0).await;
        let tx = store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();

        let (rejected, refunded) = store
            .update_transaction_with_adjustment(
                tx.id,
                TransactionPatch::reject(),
                1,
                BalanceAdjustment::single(BalanceKind::Coins, Decimal::new(5, 0)),
            )
            .await
            .unwrap();

        assert_eq!(rejected.status, TransactionStatus::Rejected);
        assert_eq!(refunded.coins, Decimal::new(5, 0));
    }

    #[tokio::test]
    async fn test_update_with_adjustment_commits_neither_on_failed_guard() {
        let store = funded_store(0, 0).await;
        let tx = store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();
        let credit = BalanceAdjustment::single(BalanceKind::Coins, Decimal::new(5, 0));

        store
            .update_transaction_with_adjustment(tx.id, TransactionPatch::reject(), 1, credit)
            .await
            .unwrap();
        let second = store
            .update_transaction_with_adjustment(tx.id, TransactionPatch::reject(), 1, credit)
            .await;

        assert!(matches!(second, Err(LedgerError::InvalidState { .. })));
        assert_eq!(store.get_account(1).await.unwrap().unwrap().coins, Decimal::new(5, 0));
    }

    #[tokio::test]
    async fn test_update_with_adjustment_commits_neither_on_failed_adjustment() {
        let store = funded_store(0, 0).await;
        let tx = store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();

        let result = store
            .update_transaction_with_adjustment(
                tx.id,
                TransactionPatch::reject(),
                1,
                BalanceAdjustment::single(BalanceKind::Coins, Decimal::new(-1, 0)),
            )
            .await;

        assert!(matches!(result, Err(LedgerError::InsufficientFunds { .. })));
        assert_eq!(
            store.get_transaction(tx.id).await.unwrap().unwrap().status,
            TransactionStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_list_transactions_applies_filter() {
        let store = funded_store(0, 0).await;
        store.open_account(3, "carol@example.com");
        store.insert_transaction(escrow_record(1, 2, 5)).await.unwrap();
        store.insert_transaction(escrow_record(3, 2, 6)).await.unwrap();

        let for_alice = store
            .list_transactions(&TransactionFilter::new().participant(1))
            .await
            .unwrap();
        let for_bob = store
            .list_transactions(&TransactionFilter::new().participant(2))
            .await
            .unwrap();

        assert_eq!(for_alice.len(), 1);
        assert_eq!(for_bob.len(), 2);
    }

    // Concurrent access tests
    // These verify that the sufficient-funds check and the write cannot be
    // interleaved by concurrent debits on the same row.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let store = Arc::new(funded_store(100, 0).await);
        let mut handles = vec![];

        for _ in 0..25 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .adjust_balance(
                        1,
                        BalanceAdjustment::single(BalanceKind::Cash, Decimal::new(-10, 0)),
                    )
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(store.get_account(1).await.unwrap().unwrap().cash, Decimal::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_get_unique_ids() {
        let store = Arc::new(funded_store(0, 0).await);
        let mut handles = vec![];

        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.insert_transaction(escrow_record(1, 2, 1)).await.unwrap().id
            }));
        }

        let mut ids = vec![];
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();

        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }
}
