//! CSV format handling for ledger commands and report output
//!
//! - `CommandRecord` is the raw row as deserialized from the command file
//! - `LedgerCommand` is a validated command ready to apply
//! - `write_accounts_csv` / `write_transactions_csv` serialize the final state
//!
//! Nothing here performs I/O beyond the writer it is handed.

use std::io::Write;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::types::{
    Account, AccountId, BalanceKind, ConversionDirection, LedgerError, Transaction, TransactionId,
};

/// One row of the command file
///
/// Columns: op, account, target, amount, tx, description. Which of the
/// optional columns are required depends on `op`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandRecord {
    pub op: String,
    pub account: AccountId,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub tx: Option<TransactionId>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A validated ledger command, acting as `account`
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    Open {
        account: AccountId,
        identifier: String,
    },
    Fund {
        account: AccountId,
        kind: BalanceKind,
        amount: Decimal,
    },
    Send {
        account: AccountId,
        recipient: String,
        amount: Decimal,
        description: String,
    },
    Buy {
        account: AccountId,
        seller: String,
        amount: Decimal,
        description: String,
    },
    Convert {
        account: AccountId,
        direction: ConversionDirection,
        amount: Decimal,
    },
    Approve {
        account: AccountId,
        tx: TransactionId,
    },
    Reject {
        account: AccountId,
        tx: TransactionId,
    },
}

impl LedgerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::Open { .. } => "open",
            LedgerCommand::Fund { .. } => "fund",
            LedgerCommand::Send { .. } => "send",
            LedgerCommand::Buy { .. } => "buy",
            LedgerCommand::Convert { .. } => "convert",
            LedgerCommand::Approve { .. } => "approve",
            LedgerCommand::Reject { .. } => "reject",
        }
    }

    pub fn account(&self) -> AccountId {
        match self {
            LedgerCommand::Open { account, .. }
            | LedgerCommand::Fund { account, .. }
            | LedgerCommand::Send { account, .. }
            | LedgerCommand::Buy { account, .. }
            | LedgerCommand::Convert { account, .. }
            | LedgerCommand::Approve { account, .. }
            | LedgerCommand::Reject { account, .. } => *account,
        }
    }
}

/// Validate a raw row into a `LedgerCommand`
///
/// Amounts are parsed but not range-checked; the ledger rejects
/// non-positive amounts itself.
pub fn convert_command_record(record: CommandRecord) -> Result<LedgerCommand, String> {
    let op = record.op.trim().to_lowercase();
    let account = record.account;
    let description = record
        .description
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let command = match op.as_str() {
        "open" => LedgerCommand::Open {
            account,
            identifier: required_target(&record, &op)?,
        },
        "fund" => {
            let kind = match required_target(&record, &op)?.to_lowercase().as_str() {
                "cash" => BalanceKind::Cash,
                "coins" => BalanceKind::Coins,
                other => {
                    return Err(format!(
                        "Invalid balance '{}' for fund on account {}",
                        other, account
                    ))
                }
            };
            LedgerCommand::Fund {
                account,
                kind,
                amount: required_amount(&record, &op)?,
            }
        }
        "send" => LedgerCommand::Send {
            account,
            recipient: required_target(&record, &op)?,
            amount: required_amount(&record, &op)?,
            description,
        },
        "buy" => LedgerCommand::Buy {
            account,
            seller: required_target(&record, &op)?,
            amount: required_amount(&record, &op)?,
            description,
        },
        "convert" => {
            let direction = match required_target(&record, &op)?.to_lowercase().as_str() {
                "to_coins" => ConversionDirection::ToCoins,
                "to_cash" => ConversionDirection::ToCash,
                other => {
                    return Err(format!(
                        "Invalid conversion '{}' for account {}",
                        other, account
                    ))
                }
            };
            LedgerCommand::Convert {
                account,
                direction,
                amount: required_amount(&record, &op)?,
            }
        }
        "approve" => LedgerCommand::Approve {
            account,
            tx: required_tx(&record, &op)?,
        },
        "reject" => LedgerCommand::Reject {
            account,
            tx: required_tx(&record, &op)?,
        },
        _ => {
            return Err(format!(
                "Invalid command '{}' for account {}",
                record.op, account
            ))
        }
    };

    Ok(command)
}

fn required_target(record: &CommandRecord, op: &str) -> Result<String, String> {
    match record.target.as_deref().map(str::trim) {
        Some(target) if !target.is_empty() => Ok(target.to_string()),
        _ => Err(format!(
            "{} for account {} requires a target",
            op, record.account
        )),
    }
}

fn required_amount(record: &CommandRecord, op: &str) -> Result<Decimal, String> {
    match record.amount.as_deref().map(str::trim) {
        Some(amount) if !amount.is_empty() => Decimal::from_str(amount)
            .map_err(|_| format!("Invalid amount '{}' for account {}", amount, record.account)),
        _ => Err(format!(
            "{} for account {} requires an amount",
            op, record.account
        )),
    }
}

fn required_tx(record: &CommandRecord, op: &str) -> Result<TransactionId, String> {
    record.tx.ok_or_else(|| {
        format!(
            "{} for account {} requires a transaction id",
            op, record.account
        )
    })
}

/// Two decimal places, half to even
fn money(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

/// Write balances as `account,identifier,cash,coins`, sorted by account id
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(["account", "identifier", "cash", "coins"])?;

    let mut sorted = accounts.to_vec();
    sorted.sort_by_key(|account| account.id);

    for account in sorted {
        writer.write_record(&[
            account.id.to_string(),
            account.identifier,
            money(account.cash),
            money(account.coins),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write ledger records sorted by id
pub fn write_transactions_csv(
    transactions: &[Transaction],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record([
        "id",
        "kind",
        "sender",
        "receiver",
        "amount",
        "currency",
        "status",
        "sender_approved",
        "receiver_approved",
        "description",
    ])?;

    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|tx| tx.id);

    for tx in sorted {
        writer.write_record(&[
            tx.id.to_string(),
            tx.kind.to_string(),
            tx.sender.to_string(),
            tx.receiver.to_string(),
            money(tx.amount),
            tx.currency.to_string(),
            tx.status.to_string(),
            tx.sender_approved.to_string(),
            tx.receiver_approved.to_string(),
            tx.description.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
