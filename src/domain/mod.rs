//! Domain types for the upgrade runner.
//!
//! This module contains the core data structures:
//! - UpgradeLog: Immutable record of one execution attempt
//! - ScriptOutcome / RunReport: What the manager hands back to callers

pub mod log;
pub mod outcome;

// Re-export commonly used types
pub use log::UpgradeLog;
pub use outcome::{RunReport, ScriptOutcome};
