//! Script Registry Integration Tests
//!
//! Tests for discovery order and registry construction from config.

use std::path::PathBuf;

use async_trait::async_trait;
use upgrader::config::{ResolvedConfig, ScriptDefinition};
use upgrader::scripts::{self, BaselineScript};
use upgrader::{LogStore, ManagerOptions, RegistryError, ScriptRegistry, StoreKind, UpgradeScript};

struct Named(&'static str);

#[async_trait]
impl UpgradeScript for Named {
    fn name(&self) -> &str {
        self.0
    }

    async fn run(&self, _store: &dyn LogStore) -> anyhow::Result<bool> {
        Ok(true)
    }
}

#[test]
fn test_find_scripts_in_version_order() {
    let registry = ScriptRegistry::new()
        .with(Named("Upgrade02Test"))
        .unwrap()
        .with(Named("Upgrade03Test"))
        .unwrap()
        .with(Named("Upgrade01"))
        .unwrap()
        .with(Named("Upgrade001Test"))
        .unwrap();

    let names: Vec<_> = registry.names().collect();
    assert_eq!(
        names,
        vec!["Upgrade001Test", "Upgrade01", "Upgrade02Test", "Upgrade03Test"]
    );
}

#[test]
fn test_zero_padded_versions_sort_numerically() {
    let registry = ScriptRegistry::new()
        .with(Named("0010_j"))
        .unwrap()
        .with(Named("0002_b"))
        .unwrap()
        .with(Named("0001_a"))
        .unwrap();

    let names: Vec<_> = registry.names().collect();
    assert_eq!(names, vec!["0001_a", "0002_b", "0010_j"]);
}

#[test]
fn test_duplicate_is_rejected_via_builder() {
    let result = ScriptRegistry::new()
        .with(Named("0001_a"))
        .unwrap()
        .with(Named("0001_a"));

    assert!(matches!(result, Err(RegistryError::DuplicateName(name)) if name == "0001_a"));
}

#[test]
fn test_shared_script_registration() {
    let mut registry = ScriptRegistry::new();
    registry
        .register_arc(std::sync::Arc::new(BaselineScript))
        .unwrap();

    assert_eq!(registry.len(), 1);
    assert!(registry.get("0000_baseline").is_some());
}

#[test]
fn test_cli_registry_from_config() {
    let config = ResolvedConfig {
        home: PathBuf::from("/tmp/upgrader-home"),
        project_root: PathBuf::from("/srv/site"),
        store: StoreKind::Memory,
        config_file: None,
        runner: ManagerOptions::default(),
        scripts: vec![
            ScriptDefinition {
                name: "0002_seed_templates".to_string(),
                command: vec!["./seed.sh".to_string()],
                working_dir: None,
            },
            ScriptDefinition {
                name: "0001_create_doc_types".to_string(),
                command: vec!["./doc_types.sh".to_string(), "--force".to_string()],
                working_dir: Some("deploy".to_string()),
            },
        ],
    };

    let registry = scripts::build_registry(&config).unwrap();
    let names: Vec<_> = registry.names().collect();
    assert_eq!(
        names,
        vec!["0000_baseline", "0001_create_doc_types", "0002_seed_templates"]
    );

    // Command scripts carry a checksum, the baseline does not
    assert!(registry.get("0000_baseline").unwrap().checksum().is_none());
    assert!(registry.get("0001_create_doc_types").unwrap().checksum().is_some());
}
