//! Upgrade scripts backed by an external command.
//!
//! Exit status 0 is success, any other status is a reported failure.
//! Failing to start the process at all is an execution fault.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ScriptDefinition;
use crate::core::UpgradeScript;
use crate::store::LogStore;

use super::content_checksum;

/// Environment variable carrying the script name into the child process
pub const SCRIPT_NAME_ENV: &str = "UPGRADER_SCRIPT_NAME";

/// A script that runs `program args...`
#[derive(Debug, Clone)]
pub struct CommandScript {
    name: String,
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    checksum: String,
}

impl CommandScript {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let checksum = content_checksum(&command_line(&program, &args));
        Self {
            name: name.into(),
            program,
            args,
            working_dir: None,
            checksum,
        }
    }

    /// Run the command from `dir` instead of the current directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build from a config entry; relative working dirs resolve against `project_root`
    pub fn from_definition(definition: &ScriptDefinition, project_root: &Path) -> Result<Self> {
        let (program, args) = definition
            .command
            .split_first()
            .with_context(|| format!("Script '{}' has an empty command", definition.name))?;

        let mut script = Self::new(definition.name.clone(), program.clone(), args.to_vec());
        if let Some(ref dir) = definition.working_dir {
            let dir = PathBuf::from(dir);
            script = script.with_working_dir(if dir.is_absolute() {
                dir
            } else {
                project_root.join(dir)
            });
        }

        Ok(script)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }
}

fn command_line(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
impl UpgradeScript for CommandScript {
    fn name(&self) -> &str {
        &self.name
    }

    fn checksum(&self) -> Option<String> {
        Some(self.checksum.clone())
    }

    async fn run(&self, _store: &dyn LogStore) -> Result<bool> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(SCRIPT_NAME_ENV, &self.name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(script = %self.name, output = %stdout.trim(), "Command output");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                script = %self.name,
                exit_code = output.status.code().unwrap_or(-1),
                stderr = %stderr.trim(),
                "Command exited unsuccessfully"
            );
            return Ok(false);
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryLogStore;

    #[test]
    fn test_from_definition_splits_command() {
        let definition = ScriptDefinition {
            name: "0001_seed".to_string(),
            command: vec!["./seed.sh".to_string(), "--all".to_string()],
            working_dir: Some("deploy".to_string()),
        };

        let script = CommandScript::from_definition(&definition, Path::new("/srv/site")).unwrap();
        assert_eq!(script.name(), "0001_seed");
        assert_eq!(script.program(), "./seed.sh");
        assert_eq!(script.args().to_vec(), vec!["--all".to_string()]);
        assert_eq!(script.working_dir(), Some(Path::new("/srv/site/deploy")));
    }

    #[test]
    fn test_empty_command_rejected() {
        let definition = ScriptDefinition {
            name: "0001_seed".to_string(),
            command: Vec::new(),
            working_dir: None,
        };

        assert!(CommandScript::from_definition(&definition, Path::new("/")).is_err());
    }

    #[test]
    fn test_checksum_tracks_command_line() {
        let a = CommandScript::new("0001_a", "sh", vec!["-c".to_string(), "exit 0".to_string()]);
        let b = CommandScript::new("0001_a", "sh", vec!["-c".to_string(), "exit 1".to_string()]);
        assert_ne!(a.checksum(), b.checksum());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_maps_to_success() {
        let store = MemoryLogStore::new();

        let ok = CommandScript::new("0001_ok", "sh", vec!["-c".to_string(), "exit 0".to_string()]);
        assert!(ok.run(&store).await.unwrap());

        let failing =
            CommandScript::new("0002_fail", "sh", vec!["-c".to_string(), "exit 3".to_string()]);
        assert!(!failing.run(&store).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_program_is_fault() {
        let store = MemoryLogStore::new();
        let script = CommandScript::new("0001_missing", "definitely-not-a-real-binary-xyz", vec![]);

        let err = script.run(&store).await.unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
