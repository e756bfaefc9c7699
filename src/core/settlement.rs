//! Escrow settlement state machine
//!
//! Drives an `EscrowBuy` record from `Pending` to exactly one terminal status.
//!
//! ```text
//!            approve(sender) / approve(receiver)
//!           ┌──────────────┐
//!           ▼              │ one flag set
//!       ┌─────────┐────────┘
//!       │ Pending │──── both flags set ───► Completed  (credit receiver)
//!       └─────────┘
//!           │
//!           └──── reject(either party) ──► Rejected   (refund sender)
//! ```
//!
//! # Exactly-once
//!
//! The flip out of `Pending` and its balance effect are committed together by
//! the store, guarded by "status is Pending". When two approvals race to be
//! the completing one, both may see both flags set, but only one guard passes;
//! the other observes `Completed` and reports `AlreadySettled` without
//! crediting again. A settlement that fails on infrastructure leaves the record
//! `Pending` with both flags set, and the next `approve` from either party
//! retries it.

use std::sync::Arc;

use super::balance_manager::BalanceManager;
use super::deadline::{bounded, LedgerConfig};
use super::traits::LedgerStore;
use crate::types::{
    Account, AccountId, BalanceAdjustment, LedgerError, Party, Transaction, TransactionId,
    TransactionPatch, TransactionStatus,
};

/// Result of a successful `approve`
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalOutcome {
    /// Approval recorded; settlement awaits the counterpart
    Awaiting(Transaction),

    /// This call completed the settlement and credited the receiver
    Settled {
        transaction: Transaction,
        receiver: Account,
    },

    /// Both parties had approved and a concurrent call already settled
    AlreadySettled(Transaction),
}

impl ApprovalOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            ApprovalOutcome::Awaiting(transaction)
            | ApprovalOutcome::AlreadySettled(transaction) => transaction,
            ApprovalOutcome::Settled { transaction, .. } => transaction,
        }
    }
}

/// Result of a successful `reject`
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub transaction: Transaction,
    /// Post-refund snapshot of the refund target
    pub refunded: Account,
}

/// Approval and rejection of escrow records
pub struct SettlementStateMachine<S> {
    store: Arc<S>,
    balances: BalanceManager<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore> SettlementStateMachine<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        let balances = BalanceManager::new(Arc::clone(&store), config);
        Self {
            store,
            balances,
            config,
        }
    }

    /// Record `party`'s approval and settle if both parties have approved
    ///
    /// Approving twice as the same party is a no-op beyond the flag already
    /// being set.
    ///
    /// # Errors
    ///
    /// * `TransactionNotFound` - no such record
    /// * `InvalidState` - the record is not a pending escrow, or it was
    ///   rejected while this approval was in flight
    pub async fn approve(
        &self,
        tx: TransactionId,
        party: Party,
    ) -> Result<ApprovalOutcome, LedgerError> {
        log::debug!("Approving transaction {} as {}", tx, party);

        let updated = bounded(
            self.config.store_timeout,
            "update_transaction",
            self.store
                .update_transaction(tx, TransactionPatch::approve(party)),
        )
        .await?;

        if !updated.both_approved() {
            log::info!(
                "Transaction {} approved by {}; awaiting counterpart",
                tx,
                party
            );
            return Ok(ApprovalOutcome::Awaiting(updated));
        }

        self.settle(updated).await
    }

    /// Approve on behalf of `account`, which must be sender or receiver
    pub async fn approve_as(
        &self,
        tx: TransactionId,
        account: AccountId,
    ) -> Result<ApprovalOutcome, LedgerError> {
        let party = self.party_of(tx, account).await?;
        self.approve(tx, party).await
    }

    /// Cancel a pending escrow and refund the held amount
    ///
    /// Either party may reject. The refund target comes from the record's kind,
    /// not from `party`.
    ///
    /// # Errors
    ///
    /// * `TransactionNotFound` - no such record
    /// * `InvalidState` - the record is not pending (including a second rejection)
    pub async fn reject(&self, tx: TransactionId, party: Party) -> Result<Rejection, LedgerError> {
        log::debug!("Rejecting transaction {} as {}", tx, party);

        let current = self.load(tx).await?;
        if current.status.is_terminal() {
            return Err(LedgerError::invalid_state(tx, current.status, "reject"));
        }
        let target = current
            .kind
            .refund_target()
            .ok_or_else(|| LedgerError::invalid_state(tx, current.status, "reject"))?;
        let refund = BalanceAdjustment::single(current.currency, current.amount);

        let (transaction, refunded) = self
            .balances
            .apply_with_transition(
                tx,
                TransactionPatch::reject(),
                current.account_of(target),
                refund,
            )
            .await?;

        log::info!(
            "Transaction {} rejected by {}; {} {} returned to account {}",
            tx,
            party,
            transaction.amount,
            transaction.currency,
            refunded.id
        );

        Ok(Rejection {
            transaction,
            refunded,
        })
    }

    /// Reject on behalf of `account`, which must be sender or receiver
    pub async fn reject_as(
        &self,
        tx: TransactionId,
        account: AccountId,
    ) -> Result<Rejection, LedgerError> {
        let party = self.party_of(tx, account).await?;
        self.reject(tx, party).await
    }

    async fn settle(&self, approved: Transaction) -> Result<ApprovalOutcome, LedgerError> {
        let target = approved
            .kind
            .settlement_target()
            .ok_or_else(|| LedgerError::invalid_state(approved.id, approved.status, "settle"))?;
        let credit = BalanceAdjustment::single(approved.currency, approved.amount);

        let result = self
            .balances
            .apply_with_transition(
                approved.id,
                TransactionPatch::complete(),
                approved.account_of(target),
                credit,
            )
            .await;

        match result {
            Ok((transaction, receiver)) => {
                log::info!(
                    "Transaction {} settled; {} {} credited to account {}",
                    transaction.id,
                    transaction.amount,
                    transaction.currency,
                    receiver.id
                );
                Ok(ApprovalOutcome::Settled {
                    transaction,
                    receiver,
                })
            }
            Err(LedgerError::InvalidState { .. }) => {
                let latest = self.load(approved.id).await?;
                if latest.status == TransactionStatus::Completed {
                    log::debug!("Transaction {} already settled", latest.id);
                    Ok(ApprovalOutcome::AlreadySettled(latest))
                } else {
                    Err(LedgerError::invalid_state(latest.id, latest.status, "approve"))
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn party_of(&self, tx: TransactionId, account: AccountId) -> Result<Party, LedgerError> {
        self.load(tx)
            .await?
            .party_of(account)
            .ok_or_else(|| LedgerError::not_participant(tx, account))
    }

    async fn load(&self, tx: TransactionId) -> Result<Transaction, LedgerError> {
        bounded(
            self.config.store_timeout,
            "get_transaction",
            self.store.get_transaction(tx),
        )
        .await?
        .ok_or_else(|| LedgerError::transaction_not_found(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::factory::TransactionFactory;
    use crate::core::memory_store::InMemoryLedgerStore;
    use crate::types::BalanceKind;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<InMemoryLedgerStore>,
        settlement: SettlementStateMachine<InMemoryLedgerStore>,
        tx: TransactionId,
    }

    /// Buyer 1 with 50 coins holds 20 in escrow for seller 2
    async fn pending_escrow() -> Fixture {
        let store = Arc::new(InMemoryLedgerStore::new());
        store.open_account(1, "buyer@example.com");
        store.open_account(2, "seller@example.com");
        store
            .adjust_balance(1, BalanceAdjustment::single(BalanceKind::Coins, Decimal::new(50, 0)))
            .await
            .unwrap();

        let factory =
            TransactionFactory::new(Arc::clone(&store), Arc::clone(&store), LedgerConfig::default());
        let receipt = factory
            .create_escrow_buy(1, "seller@example.com", Decimal::new(20, 0), "Guitar")
            .await
            .unwrap();

        Fixture {
            settlement: SettlementStateMachine::new(Arc::clone(&store), LedgerConfig::default()),
            store,
            tx: receipt.transaction.id,
        }
    }

    async fn coins(store: &InMemoryLedgerStore, id: AccountId) -> Decimal {
        store.get_account(id).await.unwrap().unwrap().coins
    }

    #[tokio::test]
    async fn test_single_approval_awaits_counterpart() {
        let f = pending_escrow().await;

        let outcome = f.settlement.approve(f.tx, Party::Sender).await.unwrap();

        match outcome {
            ApprovalOutcome::Awaiting(tx) => {
                assert!(tx.sender_approved);
                assert!(!tx.receiver_approved);
                assert_eq!(tx.status, TransactionStatus::Pending);
            }
            other => panic!("Expected Awaiting, got {:?}", other),
        }
        assert_eq!(coins(&f.store, 2).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_dual_approval_settles() {
        let f = pending_escrow().await;

        f.settlement.approve(f.tx, Party::Receiver).await.unwrap();
        let outcome = f.settlement.approve(f.tx, Party::Sender).await.unwrap();

        match outcome {
            ApprovalOutcome::Settled {
                transaction,
                receiver,
            } => {
                assert_eq!(transaction.status, TransactionStatus::Completed);
                assert_eq!(receiver.id, 2);
                assert_eq!(receiver.coins, Decimal::new(20, 0));
            }
            other => panic!("Expected Settled, got {:?}", other),
        }
        assert_eq!(coins(&f.store, 1).await, Decimal::new(30, 0));
    }

    #[tokio::test]
    async fn test_duplicate_approval_is_idempotent() {
        let f = pending_escrow().await;

        f.settlement.approve(f.tx, Party::Sender).await.unwrap();
        let outcome = f.settlement.approve(f.tx, Party::Sender).await.unwrap();

        assert!(matches!(outcome, ApprovalOutcome::Awaiting(_)));
        assert_eq!(coins(&f.store, 2).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_approve_after_completion_is_invalid_state() {
        let f = pending_escrow().await;
        f.settlement.approve(f.tx, Party::Sender).await.unwrap();
        f.settlement.approve(f.tx, Party::Receiver).await.unwrap();

        let result = f.settlement.approve(f.tx, Party::Receiver).await;

        assert_eq!(
            result,
            Err(LedgerError::invalid_state(f.tx, TransactionStatus::Completed, "approve"))
        );
        assert_eq!(coins(&f.store, 2).await, Decimal::new(20, 0));
    }

    #[tokio::test]
    async fn test_reject_refunds_buyer_once() {
        let f = pending_escrow().await;

        let rejection = f.settlement.reject(f.tx, Party::Receiver).await.unwrap();
        let second = f.settlement.reject(f.tx, Party::Sender).await;

        assert_eq!(rejection.transaction.status, TransactionStatus::Rejected);
        assert_eq!(rejection.refunded.id, 1);
        assert_eq!(rejection.refunded.coins, Decimal::new(50, 0));
        assert_eq!(
            second,
            Err(LedgerError::invalid_state(f.tx, TransactionStatus::Rejected, "reject"))
        );
        assert_eq!(coins(&f.store, 1).await, Decimal::new(50, 0));
        assert_eq!(coins(&f.store, 2).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reject_after_one_approval_still_refunds() {
        let f = pending_escrow().await;
        f.settlement.approve(f.tx, Party::Sender).await.unwrap();

        f.settlement.reject(f.tx, Party::Sender).await.unwrap();

        assert_eq!(coins(&f.store, 1).await, Decimal::new(50, 0));
        let approve = f.settlement.approve(f.tx, Party::Receiver).await;
        assert!(matches!(approve, Err(LedgerError::InvalidState { .. })));
        assert_eq!(coins(&f.store, 2).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let f = pending_escrow().await;

        assert_eq!(
            f.settlement.approve(99, Party::Sender).await,
            Err(LedgerError::transaction_not_found(99))
        );
        assert_eq!(
            f.settlement.reject(99, Party::Sender).await,
            Err(LedgerError::transaction_not_found(99))
        );
    }

    #[tokio::test]
    async fn test_acting_account_resolves_party() {
        let f = pending_escrow().await;
        f.store.open_account(3, "stranger@example.com");

        let as_seller = f.settlement.approve_as(f.tx, 2).await.unwrap();
        let as_stranger = f.settlement.reject_as(f.tx, 3).await;

        assert!(as_seller.transaction().receiver_approved);
        assert_eq!(as_stranger, Err(LedgerError::not_participant(f.tx, 3)));
    }

    #[tokio::test]
    async fn test_non_escrow_records_cannot_transition() {
        let f = pending_escrow().await;
        f.store
            .adjust_balance(1, BalanceAdjustment::single(BalanceKind::Cash, Decimal::TEN))
            .await
            .unwrap();
        let factory =
            TransactionFactory::new(Arc::clone(&f.store), Arc::clone(&f.store), LedgerConfig::default());
        let transfer = factory
            .create_direct_transfer(1, "seller@example.com", Decimal::ONE, "")
            .await
            .unwrap()
            .transaction;

        let approve = f.settlement.approve(transfer.id, Party::Receiver).await;
        let reject = f.settlement.reject(transfer.id, Party::Receiver).await;

        assert!(matches!(approve, Err(LedgerError::InvalidState { .. })));
        assert!(matches!(reject, Err(LedgerError::InvalidState { .. })));
    }
}
