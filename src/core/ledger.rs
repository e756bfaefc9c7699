//! Ledger facade
//!
//! Wires the balance manager, transaction factory and settlement state machine
//! over one store and exposes the read side used by views.

use std::cmp::Reverse;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::balance_manager::BalanceManager;
use super::deadline::{bounded, LedgerConfig};
use super::factory::{Receipt, TransactionFactory};
use super::settlement::{ApprovalOutcome, Rejection, SettlementStateMachine};
use super::traits::{IdentityResolver, LedgerStore};
use crate::types::{
    Account, AccountId, BalanceKind, ConversionDirection, LedgerError, Party, Transaction,
    TransactionFilter, TransactionId, TransactionStatus,
};

/// Escrow ledger over a store `S` and an identity directory `D`
pub struct Ledger<S, D> {
    store: Arc<S>,
    balances: BalanceManager<S>,
    factory: TransactionFactory<S, D>,
    settlement: SettlementStateMachine<S>,
    config: LedgerConfig,
}

impl<S: LedgerStore, D: IdentityResolver> Ledger<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>, config: LedgerConfig) -> Self {
        Self {
            balances: BalanceManager::new(Arc::clone(&store), config),
            factory: TransactionFactory::new(Arc::clone(&store), directory, config),
            settlement: SettlementStateMachine::new(Arc::clone(&store), config),
            store,
            config,
        }
    }

    /// Top up a balance outside of any transaction (onboarding)
    pub async fn fund(
        &self,
        account: AccountId,
        kind: BalanceKind,
        amount: Decimal,
    ) -> Result<Account, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }
        self.balances.adjust(account, kind, amount).await
    }

    /// Immediate cash transfer to the account registered under `recipient`
    pub async fn send_cash(
        &self,
        sender: AccountId,
        recipient: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<Receipt, LedgerError> {
        self.factory
            .create_direct_transfer(sender, recipient, amount, description)
            .await
    }

    /// Escrowed coin purchase from the account registered under `seller`
    pub async fn buy_with_escrow(
        &self,
        buyer: AccountId,
        seller: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<Receipt, LedgerError> {
        self.factory
            .create_escrow_buy(buyer, seller, amount, description)
            .await
    }

    pub async fn convert(
        &self,
        account: AccountId,
        direction: ConversionDirection,
        amount: Decimal,
    ) -> Result<Receipt, LedgerError> {
        self.factory
            .create_conversion(account, direction, amount)
            .await
    }

    pub async fn approve(
        &self,
        tx: TransactionId,
        party: Party,
    ) -> Result<ApprovalOutcome, LedgerError> {
        self.settlement.approve(tx, party).await
    }

    pub async fn approve_as(
        &self,
        tx: TransactionId,
        account: AccountId,
    ) -> Result<ApprovalOutcome, LedgerError> {
        self.settlement.approve_as(tx, account).await
    }

    pub async fn reject(&self, tx: TransactionId, party: Party) -> Result<Rejection, LedgerError> {
        self.settlement.reject(tx, party).await
    }

    pub async fn reject_as(
        &self,
        tx: TransactionId,
        account: AccountId,
    ) -> Result<Rejection, LedgerError> {
        self.settlement.reject_as(tx, account).await
    }

    pub async fn account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.balances.account(id).await
    }

    /// All accounts sorted by id
    pub async fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut accounts = bounded(
            self.config.store_timeout,
            "list_accounts",
            self.store.list_accounts(),
        )
        .await?;
        accounts.sort_by_key(|account| account.id);
        Ok(accounts)
    }

    pub async fn transaction(&self, tx: TransactionId) -> Result<Transaction, LedgerError> {
        bounded(
            self.config.store_timeout,
            "get_transaction",
            self.store.get_transaction(tx),
        )
        .await?
        .ok_or_else(|| LedgerError::transaction_not_found(tx))
    }

    /// Transactions matching `filter`, newest first
    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut transactions = bounded(
            self.config.store_timeout,
            "list_transactions",
            self.store.list_transactions(filter),
        )
        .await?;
        transactions.sort_by_key(|tx| Reverse((tx.created_at, tx.id)));
        Ok(transactions)
    }

    /// Every transaction `account` is a party to, newest first
    pub async fn history(&self, account: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        self.transactions(&TransactionFilter::new().participant(account))
            .await
    }

    /// `account`'s transactions still waiting on an approval, newest first
    pub async fn pending_for(&self, account: AccountId) -> Result<Vec<Transaction>, LedgerError> {
        self.transactions(
            &TransactionFilter::new()
                .participant(account)
                .status(TransactionStatus::Pending),
        )
        .await
    }
}
