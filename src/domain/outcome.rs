//! Results handed back by the script manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::log::UpgradeLog;

/// Outcome of asking the manager to run one script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScriptOutcome {
    /// The script ran; the record has been persisted
    Executed(UpgradeLog),

    /// A successful record already exists; nothing was run or written
    AlreadyRun { script_name: String },

    /// The invocation itself was unusable; the record was NOT persisted
    Invalid(UpgradeLog),
}

impl ScriptOutcome {
    /// The record for this outcome, if one was produced
    pub fn log(&self) -> Option<&UpgradeLog> {
        match self {
            Self::Executed(log) | Self::Invalid(log) => Some(log),
            Self::AlreadyRun { .. } => None,
        }
    }

    /// Consume the outcome, keeping only its record
    pub fn into_log(self) -> Option<UpgradeLog> {
        match self {
            Self::Executed(log) | Self::Invalid(log) => Some(log),
            Self::AlreadyRun { .. } => None,
        }
    }

    pub fn is_already_run(&self) -> bool {
        matches!(self, Self::AlreadyRun { .. })
    }

    /// True for executed-and-failed attempts and invalid invocations
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Executed(log) => !log.success,
            Self::Invalid(_) => true,
            Self::AlreadyRun { .. } => false,
        }
    }
}

/// Aggregate of one pass over the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// When the pass started
    pub started_at: DateTime<Utc>,

    /// When the pass finished
    pub completed_at: Option<DateTime<Utc>>,

    /// Outcomes in registry order
    pub outcomes: Vec<ScriptOutcome>,

    /// Scripts left untouched because the pass stopped early (fail-fast)
    pub not_attempted: Vec<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            outcomes: Vec::new(),
            not_attempted: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: ScriptOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn finish(mut self) -> Self {
        self.completed_at = Some(Utc::now());
        self
    }

    /// Records produced during this pass
    pub fn logs(&self) -> impl Iterator<Item = &UpgradeLog> {
        self.outcomes.iter().filter_map(ScriptOutcome::log)
    }

    /// Number of scripts actually executed
    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ScriptOutcome::Executed(_)))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.logs().filter(|l| l.success).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_already_run()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}
