//! Core ledger logic
//!
//! - `traits` - Store and identity-directory seams
//! - `memory_store` - DashMap-backed store with per-row atomicity
//! - `deadline` - Timeouts on store calls
//! - `balance_manager` - The only path that mutates balances
//! - `factory` - Transfer, escrow buy and conversion creation
//! - `settlement` - Escrow approval and rejection
//! - `ledger` - Facade and query layer

pub mod balance_manager;
pub mod deadline;
pub mod factory;
pub mod ledger;
pub mod memory_store;
pub mod settlement;
pub mod traits;

pub use balance_manager::BalanceManager;
pub use deadline::LedgerConfig;
pub use factory::{Receipt, TransactionFactory};
pub use ledger::Ledger;
pub use memory_store::InMemoryLedgerStore;
pub use settlement::{ApprovalOutcome, Rejection, SettlementStateMachine};
pub use traits::{IdentityResolver, LedgerStore};
