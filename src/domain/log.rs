//! Upgrade log records.
//!
//! One record is written per execution attempt. Records are append-only:
//! re-running a script produces a new record, it never rewrites an old one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message used when the manager is handed no script at all
pub const SCRIPT_IS_NULL: &str = "script is null";

/// Message used when a script reports a blank name
pub const SCRIPT_NAME_EMPTY: &str = "script name is empty";

/// Audit record for a single upgrade script execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLog {
    /// Unique identifier for this attempt
    pub id: Uuid,

    /// Stable identity of the script that was executed
    pub script_name: String,

    /// When the attempt started (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// Whether the script reported success
    pub success: bool,

    /// Failure message, if the script faulted or timed out
    #[serde(default)]
    pub exception: Option<String>,

    /// Total elapsed wall-clock time of the attempt
    pub runtime_ms: u64,

    /// Content checksum the script declared when it ran
    #[serde(default)]
    pub checksum: Option<String>,
}

impl UpgradeLog {
    /// Start a new record for an attempt of `script_name`
    pub fn new(script_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            script_name: script_name.into(),
            timestamp: Utc::now(),
            success: false,
            exception: None,
            runtime_ms: 0,
            checksum: None,
        }
    }

    /// Failure-shaped record for an invocation that never reached a script.
    ///
    /// These are returned to the caller but never persisted.
    pub fn invalid(script_name: impl Into<String>, reason: &str) -> Self {
        Self::new(script_name).with_exception(reason.to_string())
    }

    /// Attach a failure message
    pub fn with_exception(mut self, exception: String) -> Self {
        self.success = false;
        self.exception = Some(exception);
        self
    }

    /// Attach the script checksum
    pub fn with_checksum(mut self, checksum: Option<String>) -> Self {
        self.checksum = checksum;
        self
    }

    /// Does this record show `script_name` was already attempted?
    ///
    /// Any outcome counts; failed scripts are re-applied with `run-again`.
    pub fn records_run_of(&self, script_name: &str) -> bool {
        self.script_name == script_name
    }
}
