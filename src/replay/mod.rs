//! Command replay pipeline
//!
//! Reads a command CSV in batches and applies every command, in file order,
//! through a `Ledger` over an `InMemoryLedgerStore`, then writes the final
//! balances (and optionally the transaction log).
//!
//! ```text
//! ReplayConfig ─► tokio runtime (workers)
//!                    │
//!                    ├── AsyncReader ─► batches of LedgerCommand
//!                    ├── Ledger<InMemoryLedgerStore> ─► apply in order
//!                    └── write_accounts_csv / write_transactions_csv
//! ```
//!
//! Commands are applied one at a time. Later commands refer to transaction
//! ids assigned by earlier ones, so reordering would change the outcome.
//! A failing command is logged and skipped; only fatal I/O ends the replay.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{ApprovalOutcome, InMemoryLedgerStore, Ledger, LedgerConfig};
use crate::io::{write_accounts_csv, write_transactions_csv, AsyncReader, LedgerCommand};
use crate::types::{ErrorCategory, LedgerError, TransactionFilter};

/// Batching, threading and deadline settings for a replay
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayConfig {
    /// Commands read per batch
    pub batch_size: usize,
    /// Runtime worker threads
    pub workers: usize,
    /// Upper bound on any single store call
    pub store_timeout: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            workers: num_cpus::get(),
            store_timeout: LedgerConfig::DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl ReplayConfig {
    /// Zero values fall back to the defaults with a warning
    pub fn new(batch_size: usize, workers: usize, store_timeout: Duration) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            log::warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size,
                default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let workers = if workers == 0 {
            log::warn!(
                "Invalid workers ({}), using default ({})",
                workers,
                default.workers
            );
            default.workers
        } else {
            workers
        };

        let store_timeout = if store_timeout.is_zero() {
            log::warn!(
                "Invalid store_timeout ({:?}), using default ({:?})",
                store_timeout,
                default.store_timeout
            );
            default.store_timeout
        } else {
            store_timeout
        };

        Self {
            batch_size,
            workers,
            store_timeout,
        }
    }
}

/// Counts reported at the end of a replay
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
    pub inconsistent: usize,
}

type MemoryLedger = Ledger<InMemoryLedgerStore, InMemoryLedgerStore>;

/// Replay `input_path` and write balances to `output`
///
/// When `transactions_path` is given the full transaction log is written there too.
pub fn replay(
    config: &ReplayConfig,
    input_path: &Path,
    output: &mut dyn Write,
    transactions_path: Option<&Path>,
) -> Result<ReplaySummary, LedgerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_time()
        .build()?;

    runtime.block_on(async {
        let store = Arc::new(InMemoryLedgerStore::new());
        let ledger = Ledger::new(
            Arc::clone(&store),
            Arc::clone(&store),
            LedgerConfig::new(config.store_timeout),
        );

        let file = tokio::fs::File::open(input_path).await.map_err(|e| {
            LedgerError::IoError {
                message: format!("Failed to open file '{}': {}", input_path.display(), e),
            }
        })?;
        let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
        let mut reader = AsyncReader::new(compat_file);

        let mut summary = ReplaySummary::default();
        loop {
            let batch = reader.read_batch(config.batch_size).await;
            if batch.is_empty() {
                break;
            }

            for command in batch {
                let name = command.name();
                let account = command.account();
                match apply_command(&ledger, &store, command).await {
                    Ok(()) => summary.applied += 1,
                    Err(e) if e.category() == ErrorCategory::Consistency => {
                        log::error!("{} by account {}: {}", name, account, e);
                        summary.inconsistent += 1;
                    }
                    Err(e) => {
                        log::warn!("{} by account {} failed: {}", name, account, e);
                        summary.rejected += 1;
                    }
                }
            }
        }

        log::info!(
            "Replay finished: {} applied, {} rejected, {} inconsistent",
            summary.applied,
            summary.rejected,
            summary.inconsistent
        );

        write_accounts_csv(&ledger.accounts().await?, output)?;

        if let Some(path) = transactions_path {
            let transactions = ledger.transactions(&TransactionFilter::new()).await?;
            let mut file = File::create(path).map_err(|e| LedgerError::IoError {
                message: format!("Failed to create file '{}': {}", path.display(), e),
            })?;
            write_transactions_csv(&transactions, &mut file)?;
        }

        Ok(summary)
    })
}

/// Apply one command to the ledger
pub async fn apply_command(
    ledger: &MemoryLedger,
    store: &InMemoryLedgerStore,
    command: LedgerCommand,
) -> Result<(), LedgerError> {
    match command {
        LedgerCommand::Open {
            account,
            identifier,
        } => {
            let opened = store.open_account(account, &identifier);
            if opened.identifier != identifier {
                log::warn!(
                    "Account {} already open as {}; ignoring identifier {}",
                    account,
                    opened.identifier,
                    identifier
                );
            }
        }
        LedgerCommand::Fund {
            account,
            kind,
            amount,
        } => {
            ledger.fund(account, kind, amount).await?;
        }
        LedgerCommand::Send {
            account,
            recipient,
            amount,
            description,
        } => {
            ledger
                .send_cash(account, &recipient, amount, &description)
                .await?;
        }
        LedgerCommand::Buy {
            account,
            seller,
            amount,
            description,
        } => {
            ledger
                .buy_with_escrow(account, &seller, amount, &description)
                .await?;
        }
        LedgerCommand::Convert {
            account,
            direction,
            amount,
        } => {
            ledger.convert(account, direction, amount).await?;
        }
        LedgerCommand::Approve { account, tx } => {
            if let ApprovalOutcome::AlreadySettled(_) = ledger.approve_as(tx, account).await? {
                log::debug!("Transaction {} was already settled", tx);
            }
        }
        LedgerCommand::Reject { account, tx } => {
            ledger.reject_as(tx, account).await?;
        }
    }

    Ok(())
}
