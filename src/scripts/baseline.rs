//! Baseline marker script.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::UpgradeScript;
use crate::store::LogStore;

/// Name of the baseline record
pub const BASELINE_NAME: &str = "0000_baseline";

/// No-op script that sorts first and marks when the log was started
#[derive(Debug, Clone, Copy, Default)]
pub struct BaselineScript;

#[async_trait]
impl UpgradeScript for BaselineScript {
    fn name(&self) -> &str {
        BASELINE_NAME
    }

    async fn run(&self, _store: &dyn LogStore) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLogStore;

    #[test]
    fn test_baseline_always_succeeds() {
        let store = MemoryLogStore::new();
        let result = tokio_test::block_on(BaselineScript.run(&store)).unwrap();
        assert!(result);
    }
}
