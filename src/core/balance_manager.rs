//! Account balance management
//!
//! `BalanceManager` is the only component that changes a balance. Every change
//! is delegated to the store as a single conditional read-modify-write against
//! the latest committed row, so a sufficient-funds check can never be based on
//! a value read earlier in a caller's flow.

use std::sync::Arc;

use rust_decimal::Decimal;

use super::deadline::{bounded, LedgerConfig};
use super::traits::LedgerStore;
use crate::types::{
    Account, AccountId, BalanceAdjustment, BalanceKind, LedgerError, Transaction, TransactionId,
    TransactionPatch,
};

/// Invariant-preserving mutation of account balances
pub struct BalanceManager<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S> Clone for BalanceManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: LedgerStore> BalanceManager<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    /// Adjust one balance of `account` by `delta` (may be negative)
    ///
    /// # Returns
    ///
    /// * `Ok(Account)` - The post-mutation snapshot
    /// * `Err(LedgerError::InsufficientFunds)` - The balance would go negative; nothing changed
    /// * `Err(LedgerError::AccountNotFound)` - No such account
    /// * `Err(LedgerError::Timeout)` / `Err(LedgerError::StoreUnavailable)` - Infrastructure failure
    pub async fn adjust(
        &self,
        account: AccountId,
        kind: BalanceKind,
        delta: Decimal,
    ) -> Result<Account, LedgerError> {
        self.apply(account, BalanceAdjustment::single(kind, delta))
            .await
    }

    /// Apply a (possibly two-legged) adjustment to one account atomically
    pub async fn apply(
        &self,
        account: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<Account, LedgerError> {
        log::debug!(
            "Adjusting account {}: cash {:+}, coins {:+}",
            account,
            adjustment.cash,
            adjustment.coins
        );

        let snapshot = bounded(
            self.config.store_timeout,
            "adjust_balance",
            self.store.adjust_balance(account, adjustment),
        )
        .await?;

        log::debug!(
            "Account {} now holds cash {}, coins {}",
            snapshot.id,
            snapshot.cash,
            snapshot.coins
        );

        Ok(snapshot)
    }

    /// Apply an adjustment together with a conditional record transition
    ///
    /// Used for settlement and rejection: the record leaves `Pending` and the
    /// balance moves in the same atomic unit, or neither happens.
    pub async fn apply_with_transition(
        &self,
        tx: TransactionId,
        patch: TransactionPatch,
        account: AccountId,
        adjustment: BalanceAdjustment,
    ) -> Result<(Transaction, Account), LedgerError> {
        log::debug!(
            "Applying {} on transaction {} with adjustment to account {}",
            patch.operation,
            tx,
            account
        );

        bounded(
            self.config.store_timeout,
            "update_transaction_with_adjustment",
            self.store
                .update_transaction_with_adjustment(tx, patch, account, adjustment),
        )
        .await
    }

    /// Latest committed snapshot of an account
    pub async fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        bounded(
            self.config.store_timeout,
            "get_account",
            self.store.get_account(id),
        )
        .await?
        .ok_or_else(|| LedgerError::account_not_found(id))
    }
}
