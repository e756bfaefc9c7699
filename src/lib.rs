//! Escrow Ledger Library
//! # Overview
//!
//! A two-currency (cash and coins) ledger with immediate transfers, same-account
//! conversions and escrowed coin purchases settled by dual approval.
//!
//! # Architecture
//!
//! - [`types`] - Accounts, transactions, patches, filters and `LedgerError`
//! - [`core`] - Business logic:
//!   - [`core::balance_manager`] - The only path that mutates balances
//!   - [`core::factory`] - Creates transfers, escrow buys and conversions
//!   - [`core::settlement`] - Approves or rejects pending escrows exactly once
//!   - [`core::ledger`] - Facade and query layer
//!   - [`core::memory_store`] - DashMap-backed store
//! - [`io`] - Command CSV reading and report writing
//! - [`replay`] - Command replay pipeline used by the binary
//! - [`cli`] - Argument parsing and logging setup
//!
//! # Movement Modes
//!
//! - **Direct transfer**: cash moves from sender to receiver immediately
//! - **Escrow buy**: coins leave the buyer at creation and reach the seller
//!   only after both parties approve; a rejection refunds the buyer
//! - **Conversion**: cash and coins swap 1:1 within one account
//!
//! Across every transaction, the total of cash plus coins held by all accounts
//! and escrow is conserved.

pub mod cli;
pub mod core;
pub mod io;
pub mod replay;
pub mod types;

pub use core::{ApprovalOutcome, InMemoryLedgerStore, Ledger, LedgerConfig, Receipt, Rejection};
pub use io::{write_accounts_csv, write_transactions_csv};
pub use types::{
    Account, AccountId, BalanceKind, ConversionDirection, LedgerError, Party, Transaction,
    TransactionId, TransactionKind, TransactionStatus,
};
