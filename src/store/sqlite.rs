//! SQLite-backed log store.
//!
//! rusqlite is synchronous, so every statement runs on tokio's blocking
//! pool behind a `std::sync::Mutex`; no guard is held across an await.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::domain::UpgradeLog;

use super::{LogStore, LogStoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS upgrade_log (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    id          TEXT NOT NULL UNIQUE,
    script_name TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    success     INTEGER NOT NULL,
    exception   TEXT,
    runtime_ms  INTEGER NOT NULL,
    checksum    TEXT
);
CREATE INDEX IF NOT EXISTS idx_upgrade_log_script ON upgrade_log (script_name, seq);
";

const SELECT_COLUMNS: &str =
    "SELECT id, script_name, timestamp, success, exception, runtime_ms, checksum FROM upgrade_log";

/// Raw column values before conversion into an UpgradeLog
type RawRow = (String, String, String, bool, Option<String>, i64, Option<String>);

/// Log store on a single SQLite table; the connection closes on drop
pub struct SqliteLogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::bootstrap(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, LogStoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, LogStoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, LogStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, LogStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| LogStoreError::Poisoned)?;
            f(&guard)
        })
        .await?
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn into_log(raw: RawRow) -> Result<UpgradeLog, LogStoreError> {
        let (id, script_name, timestamp, success, exception, runtime_ms, checksum) = raw;

        let id = Uuid::parse_str(&id)
            .map_err(|e| LogStoreError::InvalidValue(format!("id '{}': {}", id, e)))?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| LogStoreError::InvalidValue(format!("timestamp '{}': {}", timestamp, e)))?
            .with_timezone(&Utc);
        let runtime_ms = u64::try_from(runtime_ms)
            .map_err(|_| LogStoreError::InvalidValue(format!("runtime_ms {}", runtime_ms)))?;

        Ok(UpgradeLog {
            id,
            script_name,
            timestamp,
            success,
            exception,
            runtime_ms,
            checksum,
        })
    }
}

#[async_trait]
impl LogStore for SqliteLogStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_log(&self, script_name: &str) -> Result<Option<UpgradeLog>, LogStoreError> {
        let script_name = script_name.to_string();
        let raw = self
            .with_conn(move |conn| {
                conn.query_row(
                    &format!(
                        "{} WHERE script_name = ?1 ORDER BY seq DESC LIMIT 1",
                        SELECT_COLUMNS
                    ),
                    params![script_name],
                    Self::read_row,
                )
                .optional()
                .map_err(Into::into)
            })
            .await?;

        raw.map(Self::into_log).transpose()
    }

    async fn save_log(&self, log: &UpgradeLog) -> Result<(), LogStoreError> {
        let runtime_ms = i64::try_from(log.runtime_ms)
            .map_err(|_| LogStoreError::InvalidValue(format!("runtime_ms {}", log.runtime_ms)))?;
        let log = log.clone();

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO upgrade_log (id, script_name, timestamp, success, exception, runtime_ms, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    log.id.to_string(),
                    log.script_name,
                    log.timestamp.to_rfc3339(),
                    log.success,
                    log.exception,
                    runtime_ms,
                    log.checksum,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn all_logs(&self) -> Result<Vec<UpgradeLog>, LogStoreError> {
        let rows = self
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY seq ASC", SELECT_COLUMNS))?;
                let rows = stmt
                    .query_map([], Self::read_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(Self::into_log).collect()
    }
}
