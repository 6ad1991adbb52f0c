//! The contract every upgrade script implements.

use anyhow::Result;
use async_trait::async_trait;

use crate::store::LogStore;

/// A named, one-shot unit of upgrade work.
///
/// Implementations should be idempotent by convention: the manager will not
/// re-run a script that has a successful record, but `run_script_again`
/// deliberately bypasses that guard.
///
/// `run` returns `Ok(true)` on success and `Ok(false)` for an expected,
/// reported failure. Returning `Err` (or panicking) is an execution fault;
/// the manager records it and moves on to the next script.
#[async_trait]
pub trait UpgradeScript: Send + Sync {
    /// Stable identity, e.g. `0003_add_meta_tabs`. Determines run order.
    fn name(&self) -> &str;

    /// Optional fingerprint of the script's content
    fn checksum(&self) -> Option<String> {
        None
    }

    /// Perform the upgrade. The store is the one the manager records into.
    async fn run(&self, store: &dyn LogStore) -> Result<bool>;
}
