//! Core upgrade logic.
//!
//! This module contains:
//! - UpgradeScript: The contract every migration implements
//! - ScriptRegistry: Deterministically ordered set of scripts
//! - ScriptManager: Main execution engine

pub mod manager;
pub mod registry;
pub mod script;

// Re-export commonly used types
pub use manager::{ManagerOptions, ScriptManager};
pub use registry::{RegistryError, ScriptRegistry};
pub use script::UpgradeScript;
