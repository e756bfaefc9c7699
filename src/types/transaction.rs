//! Transaction-related types for the escrow ledger
//!
//! This module defines the ledger record, its kind and status, the conditional
//! patch used to move an escrow record through its lifecycle, and the filter
//! used by the query layer.

use super::account::{AccountId, BalanceKind};
use super::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction identifier
///
/// Assigned by the store at insertion, starting at 1.
pub type TransactionId = u64;

/// The four money-movement modes recorded in the ledger
///
/// Each kind carries its own balance side effects; callers dispatch on the
/// variant rather than on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Cash moved from sender to receiver, completed at creation
    DirectTransfer,

    /// Coins held from the buyer (sender) until both parties approve
    ///
    /// The only kind with a `Pending` phase.
    EscrowBuy,

    /// Same-account swap of cash into coins, completed at creation
    ConversionToCoins,

    /// Same-account swap of coins into cash, completed at creation
    ConversionToCash,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::DirectTransfer => "direct_transfer",
            TransactionKind::EscrowBuy => "escrow_buy",
            TransactionKind::ConversionToCoins => "conversion_to_coins",
            TransactionKind::ConversionToCash => "conversion_to_cash",
        }
    }

    /// Whether records of this kind go through the settlement state machine
    pub fn is_escrow(&self) -> bool {
        matches!(self, TransactionKind::EscrowBuy)
    }

    /// The party credited when the transaction settles
    pub fn settlement_target(&self) -> Option<Party> {
        match self {
            TransactionKind::EscrowBuy => Some(Party::Receiver),
            _ => None,
        }
    }

    /// The party whose held funds are returned when the transaction is rejected
    pub fn refund_target(&self) -> Option<Party> {
        match self {
            TransactionKind::EscrowBuy => Some(Party::Sender),
            _ => None,
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Rejected,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Rejected => "rejected",
        }
    }

    /// `Completed` and `Rejected` admit no further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a same-account conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionDirection {
    ToCoins,
    ToCash,
}

impl ConversionDirection {
    /// The balance debited (and the recorded currency)
    pub fn source(&self) -> BalanceKind {
        match self {
            ConversionDirection::ToCoins => BalanceKind::Cash,
            ConversionDirection::ToCash => BalanceKind::Coins,
        }
    }

    /// The balance credited
    pub fn target(&self) -> BalanceKind {
        self.source().other()
    }

    pub fn kind(&self) -> TransactionKind {
        match self {
            ConversionDirection::ToCoins => TransactionKind::ConversionToCoins,
            ConversionDirection::ToCash => TransactionKind::ConversionToCash,
        }
    }

    /// Default ledger description, e.g. "Converted $20 to 20 coins"
    pub fn describe(&self, amount: Decimal) -> String {
        let amount = amount.normalize();
        match self {
            ConversionDirection::ToCoins => format!("Converted ${} to {} coins", amount, amount),
            ConversionDirection::ToCash => format!("Converted {} coins to ${}", amount, amount),
        }
    }
}

/// One side of a two-party transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Sender,
    Receiver,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Sender => f.write_str("sender"),
            Party::Receiver => f.write_str("receiver"),
        }
    }
}

/// A ledger record as persisted by the store
///
/// Records are append-only: `id`, parties, amount and `created_at` never change.
/// Only the status and approval flags of an `EscrowBuy` move, and only until
/// the record reaches a terminal status.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: TransactionId,
    pub sender: AccountId,
    /// Equal to `sender` for conversions
    pub receiver: AccountId,
    /// What the initiator typed to reach the receiver; display only
    pub counterparty_hint: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    /// Denomination of `amount` at creation
    pub currency: BalanceKind,
    pub status: TransactionStatus,
    pub sender_approved: bool,
    pub receiver_approved: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Build the stored record from an insert request and a store-assigned id
    pub fn from_new(id: TransactionId, new: NewTransaction) -> Self {
        Transaction {
            id,
            sender: new.sender,
            receiver: new.receiver,
            counterparty_hint: new.counterparty_hint,
            kind: new.kind,
            amount: new.amount,
            currency: new.currency,
            status: new.status,
            sender_approved: false,
            receiver_approved: false,
            description: new.description,
            created_at: new.created_at,
        }
    }

    /// The account on the given side
    pub fn account_of(&self, party: Party) -> AccountId {
        match party {
            Party::Sender => self.sender,
            Party::Receiver => self.receiver,
        }
    }

    /// Which side `account` is on, if any
    pub fn party_of(&self, account: AccountId) -> Option<Party> {
        if self.sender == account {
            Some(Party::Sender)
        } else if self.receiver == account {
            Some(Party::Receiver)
        } else {
            None
        }
    }

    pub fn involves(&self, account: AccountId) -> bool {
        self.party_of(account).is_some()
    }

    pub fn approved_by(&self, party: Party) -> bool {
        match party {
            Party::Sender => self.sender_approved,
            Party::Receiver => self.receiver_approved,
        }
    }

    pub fn both_approved(&self) -> bool {
        self.sender_approved && self.receiver_approved
    }

    /// Still pending and not yet approved by `party`
    pub fn awaiting(&self, party: Party) -> bool {
        self.status == TransactionStatus::Pending && !self.approved_by(party)
    }
}

/// Insert request for a new ledger record
///
/// The store assigns the id; approval flags always start `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub sender: AccountId,
    pub receiver: AccountId,
    pub counterparty_hint: Option<String>,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub currency: BalanceKind,
    pub status: TransactionStatus,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A conditional update of a ledger record
///
/// The patch only applies if the record is currently in `expected_status`.
/// Stores evaluate it while holding the row, which makes the status guard and
/// the write a single conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionPatch {
    pub expected_status: TransactionStatus,
    pub approve: Option<Party>,
    pub status: Option<TransactionStatus>,
    pub operation: &'static str,
}

impl TransactionPatch {
    /// Set the approval flag of `party` on a pending record
    pub fn approve(party: Party) -> Self {
        TransactionPatch {
            expected_status: TransactionStatus::Pending,
            approve: Some(party),
            status: None,
            operation: "approve",
        }
    }

    /// Flip a pending record to `Completed` (requires both approvals)
    pub fn complete() -> Self {
        TransactionPatch {
            expected_status: TransactionStatus::Pending,
            approve: None,
            status: Some(TransactionStatus::Completed),
            operation: "settle",
        }
    }

    /// Flip a pending record to `Rejected`
    pub fn reject() -> Self {
        TransactionPatch {
            expected_status: TransactionStatus::Pending,
            approve: None,
            status: Some(TransactionStatus::Rejected),
            operation: "reject",
        }
    }

    /// Validate the patch against the current record without applying it
    pub fn check(&self, tx: &Transaction) -> Result<(), LedgerError> {
        if tx.status != self.expected_status || !tx.kind.is_escrow() {
            return Err(LedgerError::invalid_state(tx.id, tx.status, self.operation));
        }

        if self.status == Some(TransactionStatus::Completed) && !tx.both_approved() {
            return Err(LedgerError::invalid_state(tx.id, tx.status, self.operation));
        }

        Ok(())
    }

    /// Validate and apply the patch, leaving the record untouched on error
    pub fn apply(&self, tx: &mut Transaction) -> Result<(), LedgerError> {
        self.check(tx)?;

        match self.approve {
            Some(Party::Sender) => tx.sender_approved = true,
            Some(Party::Receiver) => tx.receiver_approved = true,
            None => {}
        }

        if let Some(status) = self.status {
            tx.status = status;
        }

        Ok(())
    }
}

/// Selection criteria for listing ledger records
///
/// All set criteria must match; an empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionFilter {
    /// Account that is either sender or receiver
    pub participant: Option<AccountId>,
    pub status: Option<TransactionStatus>,
    pub kind: Option<TransactionKind>,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant(mut self, account: AccountId) -> Self {
        self.participant = Some(account);
        self
    }

    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.participant.is_none_or(|account| tx.involves(account))
            && self.status.is_none_or(|status| tx.status == status)
            && self.kind.is_none_or(|kind| tx.kind == kind)
    }
}
