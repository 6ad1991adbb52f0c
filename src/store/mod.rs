//! Persistence for upgrade logs.
//!
//! The store is the single source of truth for "has this script already
//! succeeded". Three backends ship with the crate:
//! - MemoryLogStore: process-local, for tests and dry runs
//! - JsonlLogStore: append-only JSONL file guarded by an exclusive lock
//! - SqliteLogStore: a single SQLite table
//!
//! Backends release their underlying handles when dropped.

pub mod jsonl;
pub mod memory;
pub mod sqlite;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::UpgradeLog;

pub use jsonl::JsonlLogStore;
pub use memory::MemoryLogStore;
pub use sqlite::SqliteLogStore;

/// File name of the JSONL log inside the upgrader home
pub const JSONL_FILE: &str = "upgrade_log.jsonl";

/// File name of the SQLite log inside the upgrader home
pub const SQLITE_FILE: &str = "upgrade_log.sqlite3";

/// Errors raised by log store backends
#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Log store {} is locked by another runner", .path.display())]
    Locked { path: PathBuf },

    #[error("Corrupt log record at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Log store connection mutex poisoned")]
    Poisoned,

    #[error("Log store task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Storage contract consumed by the script manager and handed to scripts
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Most recent record for `script_name`, if any
    async fn get_log(&self, script_name: &str) -> Result<Option<UpgradeLog>, LogStoreError>;

    /// Append a record
    async fn save_log(&self, log: &UpgradeLog) -> Result<(), LogStoreError>;

    /// Every record, oldest first
    async fn all_logs(&self) -> Result<Vec<UpgradeLog>, LogStoreError>;
}

#[async_trait]
impl<T: LogStore + ?Sized> LogStore for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn get_log(&self, script_name: &str) -> Result<Option<UpgradeLog>, LogStoreError> {
        (**self).get_log(script_name).await
    }

    async fn save_log(&self, log: &UpgradeLog) -> Result<(), LogStoreError> {
        (**self).save_log(log).await
    }

    async fn all_logs(&self) -> Result<Vec<UpgradeLog>, LogStoreError> {
        (**self).all_logs().await
    }
}

/// Which backend to persist logs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Append-only JSONL file
    #[default]
    Jsonl,

    /// SQLite database file
    Sqlite,

    /// Nothing persisted beyond the process
    Memory,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }

    /// Where this backend keeps its data under `home` (None for memory)
    pub fn path_in(&self, home: &Path) -> Option<PathBuf> {
        match self {
            Self::Jsonl => Some(home.join(JSONL_FILE)),
            Self::Sqlite => Some(home.join(SQLITE_FILE)),
            Self::Memory => None,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Ok(Self::Jsonl),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown log store '{}' (expected jsonl, sqlite or memory)", other)),
        }
    }
}

/// Open the configured backend rooted at `home`
pub async fn open(kind: StoreKind, home: &Path) -> Result<Box<dyn LogStore>, LogStoreError> {
    Ok(match kind {
        StoreKind::Jsonl => Box::new(JsonlLogStore::open(home.join(JSONL_FILE)).await?),
        StoreKind::Sqlite => Box::new(SqliteLogStore::open(home.join(SQLITE_FILE))?),
        StoreKind::Memory => Box::new(MemoryLogStore::new()),
    })
}
