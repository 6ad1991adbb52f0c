//! Script manager: runs upgrade scripts and records every attempt.
//!
//! For each script the manager checks the log store for an earlier
//! success, executes the script if needed, isolates any fault it raises,
//! times the attempt, and appends a new record. Scripts run strictly one
//! after another because later scripts may depend on what earlier ones
//! left behind.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::log::{SCRIPT_IS_NULL, SCRIPT_NAME_EMPTY};
use crate::domain::{RunReport, ScriptOutcome, UpgradeLog};
use crate::store::{LogStore, LogStoreError};

use super::registry::ScriptRegistry;
use super::script::UpgradeScript;

/// Knobs for a manager run
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Per-script time limit. Only enforced at await points.
    pub timeout: Option<Duration>,

    /// Keep going after a failed attempt (default), or stop the pass
    pub continue_on_failure: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            continue_on_failure: true,
        }
    }
}

/// Runs upgrade scripts against an owned log store.
///
/// The store lives exactly as long as the manager; dropping the manager
/// releases it whether or not any script failed.
pub struct ScriptManager<S: LogStore> {
    store: S,
    options: ManagerOptions,
}

impl<S: LogStore> ScriptManager<S> {
    pub fn new(store: S) -> Self {
        Self::with_options(store, ManagerOptions::default())
    }

    pub fn with_options(store: S, options: ManagerOptions) -> Self {
        Self { store, options }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Give the store back, ending the manager
    pub fn into_store(self) -> S {
        self.store
    }

    /// Stable identity of a script as recorded in the log
    pub fn script_name(&self, script: &dyn UpgradeScript) -> String {
        script.name().to_string()
    }

    /// Run a script unless it already has a record.
    ///
    /// Returns `AlreadyRun` without touching the script when any record
    /// exists for its name, whether that attempt succeeded or failed.
    pub async fn run_script(
        &self,
        script: Option<&dyn UpgradeScript>,
    ) -> Result<ScriptOutcome, LogStoreError> {
        let (script, name) = match self.validate(script) {
            Ok(valid) => valid,
            Err(log) => return Ok(ScriptOutcome::Invalid(log)),
        };

        if self.already_run(script, &name).await? {
            debug!(script = %name, "Upgrade script already run, skipping");
            return Ok(ScriptOutcome::AlreadyRun { script_name: name });
        }

        self.execute(script, name).await
    }

    /// Run a script regardless of its history. Always appends a new record.
    pub async fn run_script_again(
        &self,
        script: Option<&dyn UpgradeScript>,
    ) -> Result<ScriptOutcome, LogStoreError> {
        match self.validate(script) {
            Ok((script, name)) => self.execute(script, name).await,
            Err(log) => Ok(ScriptOutcome::Invalid(log)),
        }
    }

    /// Has this script a record on file?
    pub async fn is_already_run(&self, script: &dyn UpgradeScript) -> Result<bool, LogStoreError> {
        let name = self.script_name(script);
        self.already_run(script, &name).await
    }

    /// Names of the scripts `run_all` would execute, in order
    pub async fn pending(&self, registry: &ScriptRegistry) -> Result<Vec<String>, LogStoreError> {
        let mut pending = Vec::new();
        for script in registry.scripts() {
            if !self.is_already_run(script.as_ref()).await? {
                pending.push(self.script_name(script.as_ref()));
            }
        }
        Ok(pending)
    }

    /// Run every registered script in registry order
    #[instrument(skip_all, fields(scripts = registry.len(), store = self.store.name()))]
    pub async fn run_all(&self, registry: &ScriptRegistry) -> Result<RunReport, LogStoreError> {
        info!("Starting upgrade run");

        let mut report = RunReport::new();
        let mut scripts = registry.scripts().iter();

        while let Some(script) = scripts.next() {
            let outcome = self.run_script(Some(script.as_ref())).await?;
            let failed = outcome.is_failure();
            report.push(outcome);

            if failed && !self.options.continue_on_failure {
                report.not_attempted = scripts
                    .by_ref()
                    .map(|s| s.name().to_string())
                    .collect();
                warn!(
                    script = %script.name(),
                    remaining = report.not_attempted.len(),
                    "Stopping upgrade run after failure"
                );
                break;
            }
        }

        let report = report.finish();
        info!(
            executed = report.executed(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Upgrade run finished"
        );

        Ok(report)
    }

    /// Reject missing scripts and blank names without touching the store
    fn validate<'a>(
        &self,
        script: Option<&'a dyn UpgradeScript>,
    ) -> Result<(&'a dyn UpgradeScript, String), UpgradeLog> {
        let Some(script) = script else {
            return Err(UpgradeLog::invalid("", SCRIPT_IS_NULL));
        };

        let name = self.script_name(script);
        if name.trim().is_empty() {
            return Err(UpgradeLog::invalid(name, SCRIPT_NAME_EMPTY));
        }

        Ok((script, name))
    }

    async fn already_run(
        &self,
        script: &dyn UpgradeScript,
        name: &str,
    ) -> Result<bool, LogStoreError> {
        let Some(previous) = self.store.get_log(name).await? else {
            return Ok(false);
        };

        if !previous.records_run_of(name) {
            return Ok(false);
        }

        if let (Some(recorded), Some(current)) = (previous.checksum.as_deref(), script.checksum()) {
            if recorded != current {
                warn!(
                    script = %name,
                    recorded,
                    current = %current,
                    "Upgrade script changed since it last ran; use run-again to re-apply"
                );
            }
        }

        Ok(true)
    }

    #[instrument(skip(self, script))]
    async fn execute(
        &self,
        script: &dyn UpgradeScript,
        name: String,
    ) -> Result<ScriptOutcome, LogStoreError> {
        let mut log = UpgradeLog::new(name).with_checksum(script.checksum());

        let started = Instant::now();
        let result = self.attempt(script).await;
        log.runtime_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(true) => {
                log.success = true;
                info!(runtime_ms = log.runtime_ms, "Upgrade script succeeded");
            }
            Ok(false) => {
                log.success = false;
                warn!(runtime_ms = log.runtime_ms, "Upgrade script reported failure");
            }
            Err(message) => {
                error!(runtime_ms = log.runtime_ms, error = %message, "Upgrade script faulted");
                log = log.with_exception(message);
            }
        }

        self.store.save_log(&log).await?;
        Ok(ScriptOutcome::Executed(log))
    }

    /// Await the script, turning errors, panics and timeouts into a message
    async fn attempt(&self, script: &dyn UpgradeScript) -> Result<bool, String> {
        let guarded = AssertUnwindSafe(script.run(&self.store)).catch_unwind();

        let outcome = match self.options.timeout {
            Some(limit) => match timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(format!("script timed out after {:?}", limit)),
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(success)) => Ok(success),
            Ok(Err(e)) => Err(fault_message(format!("{:#}", e))),
            Err(panic) => Err(fault_message(panic_message(panic.as_ref()))),
        }
    }
}

fn fault_message(message: String) -> String {
    if message.trim().is_empty() {
        "script failed without a message".to_string()
    } else {
        message
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("script panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("script panicked: {}", s)
    } else {
        "script panicked".to_string()
    }
}
