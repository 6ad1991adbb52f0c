//! Built-in upgrade script kinds and the registry the CLI runs.
//!
//! - BaselineScript: marker recorded first in every log
//! - CommandScript: external command declared in the config file

pub mod baseline;
pub mod command;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::config::ResolvedConfig;
use crate::core::ScriptRegistry;

pub use baseline::BaselineScript;
pub use command::CommandScript;

/// Build the registry for a resolved configuration
pub fn build_registry(config: &ResolvedConfig) -> Result<ScriptRegistry> {
    let mut registry = ScriptRegistry::new();
    registry.register(BaselineScript)?;

    for definition in &config.scripts {
        let script = CommandScript::from_definition(definition, &config.project_root)?;
        registry
            .register(script)
            .with_context(|| format!("Failed to register script '{}'", definition.name))?;
    }

    Ok(registry)
}

/// Hash script content (first 16 hex chars of SHA256)
pub fn content_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(&hasher.finalize()[..8])
}
