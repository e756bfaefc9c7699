//! Account-related types for the escrow ledger
//!
//! This module defines the Account structure, the two balance kinds an account
//! carries, and the `BalanceAdjustment` value that describes a single atomic
//! change to one account row.

use super::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier
pub type AccountId = u32;

/// The two parallel balances every account holds
///
/// Cash is freely transferable; coins are the escrow-capable balance.
/// The same enum is used as the `currency` of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Cash,
    Coins,
}

impl BalanceKind {
    /// Lowercase name used in CSV input/output
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceKind::Cash => "cash",
            BalanceKind::Coins => "coins",
        }
    }

    /// The other balance on the same account
    pub fn other(&self) -> BalanceKind {
        match self {
            BalanceKind::Cash => BalanceKind::Coins,
            BalanceKind::Coins => BalanceKind::Cash,
        }
    }
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account state
///
/// Both balances are non-negative at every committed point. Accounts are
/// created at onboarding and only ever mutated through a `BalanceAdjustment`.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    /// The account ID
    pub id: AccountId,

    /// The identifier (email/phone) other users type to reach this account
    pub identifier: String,

    /// Freely transferable cash balance
    pub cash: Decimal,

    /// Escrow-capable coin balance
    pub coins: Decimal,
}

impl Account {
    /// Create a new account with zero balances
    pub fn new(id: AccountId, identifier: impl Into<String>) -> Self {
        Account {
            id,
            identifier: identifier.into(),
            cash: Decimal::ZERO,
            coins: Decimal::ZERO,
        }
    }

    /// Current value of one of the two balances
    pub fn balance(&self, kind: BalanceKind) -> Decimal {
        match kind {
            BalanceKind::Cash => self.cash,
            BalanceKind::Coins => self.coins,
        }
    }

    /// Sum of cash and coins (conversion is fixed 1:1)
    pub fn total(&self) -> Decimal {
        self.cash + self.coins
    }
}

/// A change to one account's balances, applied as a single atomic unit
///
/// A conversion moves value between the two balances of the same row, so the
/// adjustment carries a delta for each kind rather than a single kind/delta
/// pair. Deltas may be negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BalanceAdjustment {
    pub cash: Decimal,
    pub coins: Decimal,
}

impl BalanceAdjustment {
    /// Adjust a single balance by `delta`
    pub fn single(kind: BalanceKind, delta: Decimal) -> Self {
        match kind {
            BalanceKind::Cash => BalanceAdjustment {
                cash: delta,
                coins: Decimal::ZERO,
            },
            BalanceKind::Coins => BalanceAdjustment {
                cash: Decimal::ZERO,
                coins: delta,
            },
        }
    }

    /// Move `amount` from one balance to the other at 1:1
    pub fn swap(from: BalanceKind, amount: Decimal) -> Self {
        let mut adjustment = Self::single(from, -amount);
        match from.other() {
            BalanceKind::Cash => adjustment.cash = amount,
            BalanceKind::Coins => adjustment.coins = amount,
        }
        adjustment
    }

    /// The adjustment that exactly undoes this one
    pub fn reversed(&self) -> Self {
        BalanceAdjustment {
            cash: -self.cash,
            coins: -self.coins,
        }
    }

    /// Compute the post-adjustment balances for `account` without mutating it
    ///
    /// Fails with `InsufficientFunds` if either balance would go negative and
    /// with `ArithmeticOverflow` if the decimal range would be exceeded.
    pub fn resolve(&self, account: &Account) -> Result<(Decimal, Decimal), LedgerError> {
        let cash = Self::resolve_leg(account, BalanceKind::Cash, self.cash)?;
        let coins = Self::resolve_leg(account, BalanceKind::Coins, self.coins)?;
        Ok((cash, coins))
    }

    fn resolve_leg(
        account: &Account,
        kind: BalanceKind,
        delta: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let current = account.balance(kind);
        let next = current
            .checked_add(delta)
            .ok_or_else(|| LedgerError::arithmetic_overflow(account.id, kind))?;

        if next < Decimal::ZERO {
            return Err(LedgerError::insufficient_funds(
                account.id, kind, current, -delta,
            ));
        }

        Ok(next)
    }

    /// Apply the adjustment in place, leaving the account untouched on error
    pub fn apply(&self, account: &mut Account) -> Result<(), LedgerError> {
        let (cash, coins) = self.resolve(account)?;
        account.cash = cash;
        account.coins = coins;
        Ok(())
    }
}
