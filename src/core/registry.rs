//! Explicit, ordered registry of upgrade scripts.
//!
//! Scripts are registered in code (or from the config file) and always
//! iterated in byte-wise lexicographic order of their names. Registration
//! order does not matter, so `0002_b` runs after `0001_a` no matter which
//! was registered first.

use std::sync::Arc;

use thiserror::Error;

use super::script::UpgradeScript;

/// Errors raised while building a registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Upgrade script '{0}' is registered more than once")]
    DuplicateName(String),

    #[error("Upgrade script names must not be empty")]
    EmptyName,
}

/// Ordered set of upgrade scripts keyed by name
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    /// Kept sorted by name at all times
    scripts: Vec<Arc<dyn UpgradeScript>>,
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script, keeping the registry sorted
    pub fn register<S>(&mut self, script: S) -> Result<(), RegistryError>
    where
        S: UpgradeScript + 'static,
    {
        self.register_arc(Arc::new(script))
    }

    /// Add an already shared script
    pub fn register_arc(&mut self, script: Arc<dyn UpgradeScript>) -> Result<(), RegistryError> {
        let name = script.name();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }

        match self
            .scripts
            .binary_search_by(|existing| existing.name().cmp(name))
        {
            Ok(_) => Err(RegistryError::DuplicateName(name.to_string())),
            Err(pos) => {
                self.scripts.insert(pos, script);
                Ok(())
            }
        }
    }

    /// Builder-style registration
    pub fn with<S>(mut self, script: S) -> Result<Self, RegistryError>
    where
        S: UpgradeScript + 'static,
    {
        self.register(script)?;
        Ok(self)
    }

    /// All scripts in run order
    pub fn scripts(&self) -> &[Arc<dyn UpgradeScript>] {
        &self.scripts
    }

    /// Look up a script by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn UpgradeScript>> {
        self.scripts
            .binary_search_by(|existing| existing.name().cmp(name))
            .ok()
            .map(|pos| &self.scripts[pos])
    }

    /// Script names in run order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.iter().map(|s| s.name())
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }
}
