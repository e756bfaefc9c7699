//! Bounded store calls
//!
//! Every store call made by the ledger goes through [`bounded`], so a hung
//! store surfaces as a retryable `LedgerError::Timeout` instead of blocking
//! the caller.

use std::future::Future;
use std::time::Duration;

use crate::types::LedgerError;

/// Ledger-wide settings shared by the balance manager, factory and settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Upper bound on any single store call
    pub store_timeout: Duration,
}

impl LedgerConfig {
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(store_timeout: Duration) -> Self {
        Self { store_timeout }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Await `call`, failing with `Timeout` once `limit` elapses
///
/// Must be awaited inside a tokio runtime with the time driver enabled.
pub async fn bounded<T, F>(limit: Duration, operation: &str, call: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("Store call {} exceeded {:?}", operation, limit);
            Err(LedgerError::timeout(operation))
        }
    }
}
