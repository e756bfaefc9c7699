//! Transaction creation for the three mutating movement modes
//!
//! `TransactionFactory` validates a request, applies the balance side effects
//! for its mode, and appends the ledger record. All validation happens before
//! the first mutation, so business-rule failures never leave partial state.
//!
//! # Multi-leg protocol
//!
//! The store only guarantees atomicity per row, so operations spanning several
//! mutations follow a compensation sequence:
//!
//! ```text
//! direct transfer:  debit sender ─► credit receiver ─► insert (Completed)
//!                        ▲               │ fail            │ fail
//!                        └── refund ◄────┘                 │
//!                        └── refund ◄── debit receiver ◄───┘
//!
//! escrow buy:       hold buyer coins ─► insert (Pending)
//!                        ▲                  │ fail
//!                        └── refund ◄───────┘
//!
//! conversion:       swap (one row, both legs) ─► insert (Completed)
//!                        ▲                          │ fail
//!                        └── reverse swap ◄─────────┘
//! ```
//!
//! A successful compensation returns the original error. If a compensation
//! itself fails, the caller gets `ConsistencyViolation` listing the legs that
//! remain applied.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;

use super::balance_manager::BalanceManager;
use super::deadline::{bounded, LedgerConfig};
use super::traits::{IdentityResolver, LedgerStore};
use crate::types::{
    Account, AccountId, BalanceAdjustment, BalanceKind, ConversionDirection, LedgerError, Leg,
    NewTransaction, Transaction, TransactionKind, TransactionStatus,
};

/// A created ledger record with post-mutation snapshots of the touched accounts
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    pub transaction: Transaction,
    /// Initiator first, then the counterparty if its balance moved
    pub accounts: Vec<Account>,
}

/// A mutation that has been durably applied and may need reversing
#[derive(Debug, Clone, Copy)]
struct Applied {
    account: AccountId,
    adjustment: BalanceAdjustment,
}

impl Applied {
    fn new(account: AccountId, adjustment: BalanceAdjustment) -> Self {
        Self {
            account,
            adjustment,
        }
    }

    fn legs(&self) -> Vec<Leg> {
        [
            (BalanceKind::Cash, self.adjustment.cash),
            (BalanceKind::Coins, self.adjustment.coins),
        ]
        .into_iter()
        .filter(|(_, delta)| !delta.is_zero())
        .map(|(kind, delta)| Leg::new(self.account, kind, delta))
        .collect()
    }
}

/// Validates and creates ledger records
pub struct TransactionFactory<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    balances: BalanceManager<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore, D: IdentityResolver> TransactionFactory<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>, config: LedgerConfig) -> Self {
        let balances = BalanceManager::new(Arc::clone(&store), config);
        Self {
            store,
            directory,
            balances,
            config,
        }
    }

    /// Send cash from `sender` to the account registered under `recipient`
    ///
    /// Completes synchronously; there is no pending phase.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` - `amount` is not positive
    /// * `RecipientNotFound` - `recipient` does not resolve to an account
    /// * `SelfTransfer` - `recipient` resolves to `sender`
    /// * `InsufficientFunds` - sender's cash is short
    /// * `ConsistencyViolation` - a later leg failed and could not be compensated
    pub async fn create_direct_transfer(
        &self,
        sender: AccountId,
        recipient: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<Receipt, LedgerError> {
        const OPERATION: &str = "send";

        validate_amount(amount)?;
        let receiver = self.resolve_counterparty(sender, recipient, OPERATION).await?;

        let debit = Applied::new(sender, BalanceAdjustment::single(BalanceKind::Cash, -amount));
        let sender_snapshot = self.balances.apply(debit.account, debit.adjustment).await?;

        let credit = Applied::new(receiver, BalanceAdjustment::single(BalanceKind::Cash, amount));
        let receiver_snapshot = match self.balances.apply(credit.account, credit.adjustment).await
        {
            Ok(snapshot) => snapshot,
            Err(cause) => return Err(self.compensate(OPERATION, vec![debit], cause).await),
        };

        let record = NewTransaction {
            sender,
            receiver,
            counterparty_hint: Some(recipient.trim().to_string()),
            kind: TransactionKind::DirectTransfer,
            amount,
            currency: BalanceKind::Cash,
            status: TransactionStatus::Completed,
            description: description.trim().to_string(),
            created_at: Utc::now(),
        };

        let transaction = match self.insert(record).await {
            Ok(transaction) => transaction,
            Err(cause) => return Err(self.compensate(OPERATION, vec![debit, credit], cause).await),
        };

        log::info!(
            "Transaction {}: account {} sent {} cash to account {}",
            transaction.id,
            sender,
            amount,
            receiver
        );

        Ok(Receipt {
            transaction,
            accounts: vec![sender_snapshot, receiver_snapshot],
        })
    }

    /// Hold `amount` coins from `buyer` in escrow for the account registered under `seller`
    ///
    /// The record starts `Pending` with both approvals unset. The seller's
    /// balance does not move until settlement.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount`, `RecipientNotFound`, `SelfTransfer` - as for direct transfer
    /// * `InsufficientFunds` - buyer's coins are short; no record is created
    pub async fn create_escrow_buy(
        &self,
        buyer: AccountId,
        seller: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<Receipt, LedgerError> {
        const OPERATION: &str = "buy";

        validate_amount(amount)?;
        let receiver = self.resolve_counterparty(buyer, seller, OPERATION).await?;

        let hold = Applied::new(buyer, BalanceAdjustment::single(BalanceKind::Coins, -amount));
        let buyer_snapshot = self.balances.apply(hold.account, hold.adjustment).await?;

        let record = NewTransaction {
            sender: buyer,
            receiver,
            counterparty_hint: Some(seller.trim().to_string()),
            kind: TransactionKind::EscrowBuy,
            amount,
            currency: BalanceKind::Coins,
            status: TransactionStatus::Pending,
            description: description.trim().to_string(),
            created_at: Utc::now(),
        };

        let transaction = match self.insert(record).await {
            Ok(transaction) => transaction,
            Err(cause) => return Err(self.compensate(OPERATION, vec![hold], cause).await),
        };

        log::info!(
            "Transaction {}: account {} holds {} coins in escrow for account {}",
            transaction.id,
            buyer,
            amount,
            receiver
        );

        Ok(Receipt {
            transaction,
            accounts: vec![buyer_snapshot],
        })
    }

    /// Swap `amount` between the two balances of `account` at 1:1
    ///
    /// Both legs are applied to the row in one atomic adjustment. The record's
    /// currency is the source balance.
    ///
    /// # Errors
    ///
    /// * `InvalidAmount` - `amount` is not positive
    /// * `InsufficientFunds` - the source balance is short
    pub async fn create_conversion(
        &self,
        account: AccountId,
        direction: ConversionDirection,
        amount: Decimal,
    ) -> Result<Receipt, LedgerError> {
        const OPERATION: &str = "convert";

        validate_amount(amount)?;

        let swap = Applied::new(account, BalanceAdjustment::swap(direction.source(), amount));
        let snapshot = self.balances.apply(swap.account, swap.adjustment).await?;

        let record = NewTransaction {
            sender: account,
            receiver: account,
            counterparty_hint: None,
            kind: direction.kind(),
            amount,
            currency: direction.source(),
            status: TransactionStatus::Completed,
            description: direction.describe(amount),
            created_at: Utc::now(),
        };

        let transaction = match self.insert(record).await {
            Ok(transaction) => transaction,
            Err(cause) => return Err(self.compensate(OPERATION, vec![swap], cause).await),
        };

        log::info!("Transaction {}: account {} {}", transaction.id, account, transaction.description);

        Ok(Receipt {
            transaction,
            accounts: vec![snapshot],
        })
    }

    /// Resolve the counterparty and make sure both rows exist before any mutation
    async fn resolve_counterparty(
        &self,
        initiator: AccountId,
        identifier: &str,
        operation: &str,
    ) -> Result<AccountId, LedgerError> {
        let counterparty = bounded(
            self.config.store_timeout,
            "resolve_account",
            self.directory.resolve_account(identifier),
        )
        .await?
        .ok_or_else(|| LedgerError::recipient_not_found(identifier.trim()))?;

        if counterparty == initiator {
            return Err(LedgerError::self_transfer(initiator, operation));
        }

        self.balances.account(initiator).await?;
        match self.balances.account(counterparty).await {
            Ok(_) => {}
            Err(LedgerError::AccountNotFound { .. }) => {
                return Err(LedgerError::recipient_not_found(identifier.trim()))
            }
            Err(e) => return Err(e),
        }

        Ok(counterparty)
    }

    async fn insert(&self, record: NewTransaction) -> Result<Transaction, LedgerError> {
        bounded(
            self.config.store_timeout,
            "insert_transaction",
            self.store.insert_transaction(record),
        )
        .await
    }

    /// Reverse `applied` newest-first and return the error to report
    async fn compensate(
        &self,
        operation: &str,
        mut applied: Vec<Applied>,
        cause: LedgerError,
    ) -> LedgerError {
        log::warn!("Compensating {} after failure: {}", operation, cause);

        while let Some(step) = applied.last().copied() {
            if let Err(failure) = self
                .balances
                .apply(step.account, step.adjustment.reversed())
                .await
            {
                let legs = applied.iter().flat_map(Applied::legs).collect();
                let violation = LedgerError::consistency_violation(
                    operation,
                    None,
                    legs,
                    format!("{}; compensation failed: {}", cause, failure),
                );
                log::error!("{}", violation);
                return violation;
            }
            applied.pop();
        }

        cause
    }
}

fn validate_amount(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount));
    }
    Ok(())
}
