//! Append-only log store with file-based persistence.
//!
//! Records are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy inspection. A sibling `.lock` file is held with an exclusive
//! advisory lock for as long as the store is open, so two runners can
//! never interleave writes into the same log.
//!
//! The file is replayed once at open; the lock makes this store the only
//! writer, so lookups are served from the in-memory copy afterwards.
//! A record torn by a crash mid-append is dropped (or completed, if the
//! newline is all that is missing) before the replay.

use std::fs::File as StdFile;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::UpgradeLog;

use super::{LogStore, LogStoreError};

/// Replayed records plus the byte length of the file they came from
#[derive(Debug, Default)]
struct Journal {
    logs: Vec<UpgradeLog>,
    len: u64,
}

/// File-based log store using JSONL format
pub struct JsonlLogStore {
    /// Path to the JSONL file
    log_path: PathBuf,

    /// Path to the lock file
    lock_path: PathBuf,

    /// Held open (and locked) for the lifetime of the store
    lock_file: StdFile,

    journal: Mutex<Journal>,
}

impl JsonlLogStore {
    /// Open (creating if needed) the log at `log_path` and take the writer lock
    pub async fn open(log_path: impl Into<PathBuf>) -> Result<Self, LogStoreError> {
        let log_path = log_path.into();

        if let Some(parent) = log_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let lock_path = log_path.with_extension("lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(LogStoreError::Locked { path: lock_path });
        }

        // Dropping `lock_file` on error releases the lock again
        let journal = replay(&log_path).await?;

        debug!(
            path = %log_path.display(),
            records = journal.logs.len(),
            "Opened JSONL log store"
        );

        Ok(Self {
            log_path,
            lock_path,
            lock_file,
            journal: Mutex::new(journal),
        })
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Get the path to the lock file
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

/// Read every record in order, repairing a torn final line first
async fn replay(log_path: &Path) -> Result<Journal, LogStoreError> {
    if !log_path.exists() {
        return Ok(Journal::default());
    }

    let mut bytes = fs::read(log_path).await?;
    let complete = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |i| i + 1);

    if complete < bytes.len() {
        let tail = &bytes[complete..];
        let mut file = OpenOptions::new().write(true).open(log_path).await?;

        if serde_json::from_slice::<UpgradeLog>(tail).is_ok() {
            warn!(path = %log_path.display(), "Completing log record with missing newline");
            file.seek(std::io::SeekFrom::End(0)).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
            bytes.push(b'\n');
        } else {
            warn!(
                path = %log_path.display(),
                bytes = tail.len(),
                "Discarding torn log record at end of file"
            );
            file.set_len(complete as u64).await?;
            bytes.truncate(complete);
        }
        file.sync_data().await?;
    }

    let len = bytes.len() as u64;
    let content = String::from_utf8(bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut logs = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let log: UpgradeLog = serde_json::from_str(line)
            .map_err(|source| LogStoreError::Corrupt { line: idx + 1, source })?;
        logs.push(log);
    }

    Ok(Journal { logs, len })
}

impl Drop for JsonlLogStore {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

#[async_trait]
impl LogStore for JsonlLogStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn get_log(&self, script_name: &str) -> Result<Option<UpgradeLog>, LogStoreError> {
        let journal = self.journal.lock().await;
        Ok(journal
            .logs
            .iter()
            .rev()
            .find(|log| log.script_name == script_name)
            .cloned())
    }

    async fn save_log(&self, log: &UpgradeLog) -> Result<(), LogStoreError> {
        let line = format!("{}\n", serde_json::to_string(log)?);
        let mut journal = self.journal.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await
        }
        .await;

        if let Err(e) = written {
            // Cut back to the last whole record so the next append starts clean
            if let Err(rollback) = file.set_len(journal.len).await {
                warn!(error = %rollback, "Failed to roll back partial log write");
            }
            return Err(e.into());
        }

        journal.len += line.len() as u64;
        journal.logs.push(log.clone());
        Ok(())
    }

    async fn all_logs(&self) -> Result<Vec<UpgradeLog>, LogStoreError> {
        Ok(self.journal.lock().await.logs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_replay_order() {
        let temp = TempDir::new().unwrap();
        let store = JsonlLogStore::open(temp.path().join("upgrade_log.jsonl"))
            .await
            .unwrap();

        for i in 0..3 {
            let log = UpgradeLog::new(format!("000{}_step", i));
            store.save_log(&log).await.unwrap();
        }

        let logs = store.all_logs().await.unwrap();
        assert_eq!(logs.len(), 3);
        for (i, log) in logs.iter().enumerate() {
            assert_eq!(log.script_name, format!("000{}_step", i));
        }
    }

    #[tokio::test]
    async fn test_empty_store_replays_nothing() {
        let temp = TempDir::new().unwrap();
        let store = JsonlLogStore::open(temp.path().join("nested/dir/log.jsonl"))
            .await
            .unwrap();

        assert!(store.all_logs().await.unwrap().is_empty());
        assert!(store.get_log("0001_a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_is_locked_out() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upgrade_log.jsonl");

        let first = JsonlLogStore::open(&path).await.unwrap();
        let second = JsonlLogStore::open(&path).await;
        assert!(matches!(second, Err(LogStoreError::Locked { .. })));

        drop(first);
        assert!(JsonlLogStore::open(&path).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_line_is_reported_on_open() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upgrade_log.jsonl");

        let store = JsonlLogStore::open(&path).await.unwrap();
        store.save_log(&UpgradeLog::new("0001_a")).await.unwrap();
        drop(store);
        append_raw(&path, b"{not json\n");

        let result = JsonlLogStore::open(&path).await;
        assert!(matches!(result, Err(LogStoreError::Corrupt { line: 2, .. })));
    }

    #[tokio::test]
    async fn test_lookups_do_not_reread_the_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upgrade_log.jsonl");

        let store = JsonlLogStore::open(&path).await.unwrap();
        store.save_log(&UpgradeLog::new("0001_a")).await.unwrap();
        store.save_log(&UpgradeLog::new("0002_b").with_exception("boom".to_string())).await.unwrap();

        // Only this store writes the file while it holds the lock
        append_raw(&path, b"{not json\n");

        let latest = store.get_log("0002_b").await.unwrap().unwrap();
        assert_eq!(latest.exception.as_deref(), Some("boom"));
        assert_eq!(store.all_logs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_torn_final_record_is_discarded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upgrade_log.jsonl");

        let store = JsonlLogStore::open(&path).await.unwrap();
        store.save_log(&UpgradeLog::new("0001_a")).await.unwrap();
        drop(store);
        append_raw(&path, br#"{"id":"6f1c","script_name":"0002_"#);

        let store = JsonlLogStore::open(&path).await.unwrap();
        let logs = store.all_logs().await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].script_name, "0001_a");
        assert!(std::fs::read_to_string(&path).unwrap().ends_with('\n'));

        store.save_log(&UpgradeLog::new("0002_b")).await.unwrap();
        drop(store);

        let store = JsonlLogStore::open(&path).await.unwrap();
        let names: Vec<_> = store
            .all_logs()
            .await
            .unwrap()
            .into_iter()
            .map(|log| log.script_name)
            .collect();
        assert_eq!(names, vec!["0001_a", "0002_b"]);
    }

    #[tokio::test]
    async fn test_record_missing_only_newline_is_kept() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("upgrade_log.jsonl");

        let log = UpgradeLog::new("0001_a");
        append_raw(&path, serde_json::to_string(&log).unwrap().as_bytes());

        let store = JsonlLogStore::open(&path).await.unwrap();
        assert_eq!(store.get_log("0001_a").await.unwrap().unwrap().id, log.id);

        store.save_log(&UpgradeLog::new("0002_b")).await.unwrap();
        drop(store);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        use std::io::Write;
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(bytes))
            .unwrap();
    }
}
