//! In-memory log store.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::UpgradeLog;

use super::{LogStore, LogStoreError};

/// Process-local store; contents vanish with the value
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    logs: Mutex<Vec<UpgradeLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with existing history
    pub fn with_logs(logs: Vec<UpgradeLog>) -> Self {
        Self {
            logs: Mutex::new(logs),
        }
    }

    pub async fn len(&self) -> usize {
        self.logs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.logs.lock().await.is_empty()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_log(&self, script_name: &str) -> Result<Option<UpgradeLog>, LogStoreError> {
        let logs = self.logs.lock().await;
        Ok(logs
            .iter()
            .rev()
            .find(|log| log.script_name == script_name)
            .cloned())
    }

    async fn save_log(&self, log: &UpgradeLog) -> Result<(), LogStoreError> {
        self.logs.lock().await.push(log.clone());
        Ok(())
    }

    async fn all_logs(&self) -> Result<Vec<UpgradeLog>, LogStoreError> {
        Ok(self.logs.lock().await.clone())
    }
}
