//! upgrader - Versioned, idempotent upgrade-script runner
//!
//! Applies an ordered sequence of one-shot upgrade scripts and durably
//! records every attempt, so re-running the tool only executes scripts
//! that have not yet succeeded.
//!
//! # Architecture
//!
//! - Every attempt is recorded as an immutable `UpgradeLog`
//! - "Already run" is decided from the log store alone
//! - A failing script is recorded and the run moves on to the next one
//!
//! # Modules
//!
//! - `core`: Script contract, registry and manager
//! - `store`: Log store backends (memory, JSONL, SQLite)
//! - `domain`: Data structures (UpgradeLog, ScriptOutcome, RunReport)
//! - `scripts`: Built-in script kinds (baseline, external command)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Apply pending scripts
//! upgrader run
//!
//! # Re-apply one script regardless of history
//! upgrader run-again 0003_add_meta_tabs
//!
//! # Inspect the audit trail
//! upgrader history --limit 50
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod scripts;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{ManagerOptions, RegistryError, ScriptManager, ScriptRegistry, UpgradeScript};
pub use domain::{RunReport, ScriptOutcome, UpgradeLog};
pub use store::{JsonlLogStore, LogStore, LogStoreError, MemoryLogStore, SqliteLogStore, StoreKind};
