//! Configuration for the upgrade runner.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (UPGRADER_HOME, UPGRADER_STORE)
//! 2. Config file (.upgrader/config.yaml)
//! 3. Defaults (~/.upgrader, JSONL store)
//!
//! Config file discovery:
//! - Searches current directory and parents for .upgrader/config.yaml
//! - `home` is relative to the .upgrader/ directory
//! - Script working directories are relative to the project root
//!   (the directory containing .upgrader/)

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::ManagerOptions;
use crate::store::StoreKind;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    /// State directory (relative to .upgrader/)
    pub home: Option<String>,
    pub store: Option<StoreKind>,
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Command scripts, in any order
    #[serde(default)]
    pub scripts: Vec<ScriptDefinition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerConfig {
    pub timeout_seconds: Option<u64>,
    pub continue_on_failure: Option<bool>,
}

impl RunnerConfig {
    fn resolve(&self) -> ManagerOptions {
        let defaults = ManagerOptions::default();
        ManagerOptions {
            timeout: self
                .timeout_seconds
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            continue_on_failure: self
                .continue_on_failure
                .unwrap_or(defaults.continue_on_failure),
        }
    }
}

/// An upgrade script declared as an external command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptDefinition {
    pub name: String,
    /// Program followed by its arguments
    pub command: Vec<String>,
    pub working_dir: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory holding the upgrade log
    pub home: PathBuf,
    /// Directory that relative script paths resolve against
    pub project_root: PathBuf,
    /// Log store backend
    pub store: StoreKind,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Manager settings
    pub runner: ManagerOptions,
    /// Command scripts from the config file
    pub scripts: Vec<ScriptDefinition>,
}

impl ResolvedConfig {
    /// Location of the log for the configured backend (None for memory)
    pub fn store_path(&self) -> Option<PathBuf> {
        self.store.path_in(&self.home)
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".upgrader").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn store_from_env() -> Result<Option<StoreKind>> {
    match std::env::var("UPGRADER_STORE") {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e: String| anyhow::anyhow!("Invalid UPGRADER_STORE: {}", e)),
        Err(_) => Ok(None),
    }
}

/// Load configuration, searching for a config file from `start`
pub fn load_config_from(start: &Path) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".upgrader");

    let env_home = std::env::var("UPGRADER_HOME").ok().map(PathBuf::from);
    let env_store = store_from_env()?;

    let config_file = find_config_file(start);

    let resolved = if let Some(ref config_path) = config_file {
        let config = load_config_file(config_path)?;

        let upgrader_dir = config_path.parent().unwrap_or(Path::new("."));
        let project_root = upgrader_dir
            .parent()
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let home = if let Some(home) = env_home {
            home
        } else if let Some(ref home_path) = config.home {
            resolve_path(upgrader_dir, home_path)
        } else {
            default_home
        };

        ResolvedConfig {
            home,
            project_root,
            store: env_store.or(config.store).unwrap_or_default(),
            config_file: Some(config_path.clone()),
            runner: config.runner.resolve(),
            scripts: config.scripts,
        }
    } else {
        ResolvedConfig {
            home: env_home.unwrap_or(default_home),
            project_root: start.to_path_buf(),
            store: env_store.unwrap_or_default(),
            config_file: None,
            runner: ManagerOptions::default(),
            scripts: Vec::new(),
        }
    };

    Ok(resolved)
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}
