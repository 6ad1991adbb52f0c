//! Command-line interface for upgrader.
//!
//! Provides commands for applying pending upgrade scripts, forcing a
//! script to run again, and inspecting the persisted upgrade log.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, ResolvedConfig};
use crate::core::{ScriptManager, ScriptRegistry};
use crate::domain::{RunReport, ScriptOutcome, UpgradeLog};
use crate::scripts;
use crate::store::{self, LogStore, StoreKind};

/// upgrader - Versioned, idempotent upgrade-script runner
#[derive(Parser, Debug)]
#[command(name = "upgrader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log store backend (overrides config and UPGRADER_STORE)
    #[arg(long, global = true, value_enum)]
    pub store: Option<StoreKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every script that has not yet succeeded
    Run,

    /// Run one script again, ignoring its history
    RunAgain {
        /// Script name (e.g. 0003_add_meta_tabs)
        name: String,
    },

    /// List scripts that `run` would execute
    Pending,

    /// List all registered scripts with their latest status
    List,

    /// Show the persisted upgrade log
    History {
        /// Only show records for this script
        #[arg(short, long)]
        script: Option<String>,

        /// Maximum number of records to show (most recent)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = resolve_config(self.store)?;

        match self.command {
            Commands::Run => run_all(&config).await,
            Commands::RunAgain { name } => run_again(&config, &name).await,
            Commands::Pending => show_pending(&config).await,
            Commands::List => list_scripts(&config).await,
            Commands::History { script, limit } => show_history(&config, script, limit).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Global config with the command-line store override applied
fn resolve_config(store_override: Option<StoreKind>) -> Result<ResolvedConfig> {
    let mut config = config::config()?.clone();
    if let Some(kind) = store_override {
        config.store = kind;
    }
    Ok(config)
}

async fn open_manager(config: &ResolvedConfig) -> Result<ScriptManager<Box<dyn LogStore>>> {
    let store = store::open(config.store, &config.home)
        .await
        .with_context(|| {
            format!(
                "Failed to open {} log store in {}",
                config.store,
                config.home.display()
            )
        })?;
    Ok(ScriptManager::with_options(store, config.runner.clone()))
}

fn load_registry(config: &ResolvedConfig) -> Result<ScriptRegistry> {
    scripts::build_registry(config).context("Failed to build script registry")
}

/// Apply all pending scripts
async fn run_all(config: &ResolvedConfig) -> Result<()> {
    let registry = load_registry(config)?;
    let manager = open_manager(config).await?;

    let report = manager.run_all(&registry).await?;
    // Release the store before deciding the exit status
    drop(manager);

    print_report(&report);

    if report.has_failures() {
        std::process::exit(1);
    }

    Ok(())
}

/// Force one script to run again
async fn run_again(config: &ResolvedConfig, name: &str) -> Result<()> {
    let registry = load_registry(config)?;
    let script = registry
        .get(name)
        .with_context(|| format!("No upgrade script named '{}'", name))?;

    let manager = open_manager(config).await?;
    let outcome = manager.run_script_again(Some(script.as_ref())).await?;
    drop(manager);

    let failed = outcome.is_failure();
    if let Some(log) = outcome.log() {
        print_log_header();
        print_log(log);
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

/// Show scripts still to be run
async fn show_pending(config: &ResolvedConfig) -> Result<()> {
    let registry = load_registry(config)?;
    let manager = open_manager(config).await?;

    let pending = manager.pending(&registry).await?;
    if pending.is_empty() {
        println!("Nothing to do: all {} scripts have run", registry.len());
        return Ok(());
    }

    for name in &pending {
        println!("{}", name);
    }
    eprintln!("\n[{} of {} scripts pending]", pending.len(), registry.len());

    Ok(())
}

/// List registered scripts with their latest status
async fn list_scripts(config: &ResolvedConfig) -> Result<()> {
    let registry = load_registry(config)?;
    let manager = open_manager(config).await?;

    if registry.is_empty() {
        println!("No upgrade scripts registered");
        return Ok(());
    }

    println!("{:<40} {:<10} {:<26}", "SCRIPT", "STATUS", "LAST RUN");
    println!("{}", "-".repeat(78));

    for script in registry.scripts() {
        let latest = manager.store().get_log(script.name()).await?;
        let (status, last_run) = match latest {
            Some(log) if log.success => ("done", log.timestamp.to_rfc3339()),
            Some(log) => ("failed", log.timestamp.to_rfc3339()),
            None => ("pending", "-".to_string()),
        };
        println!("{:<40} {:<10} {:<26}", script.name(), status, last_run);
    }

    Ok(())
}

/// Show persisted records and a success/failure summary
async fn show_history(config: &ResolvedConfig, script: Option<String>, limit: usize) -> Result<()> {
    let manager = open_manager(config).await?;

    let logs: Vec<UpgradeLog> = manager
        .store()
        .all_logs()
        .await?
        .into_iter()
        .filter(|log| script.as_deref().map_or(true, |name| log.script_name == name))
        .collect();

    if logs.is_empty() {
        println!("No upgrade log records found");
        return Ok(());
    }

    let succeeded = logs.iter().filter(|log| log.success).count();
    let failed = logs.len() - succeeded;

    print_log_header();
    for log in logs.iter().skip(logs.len().saturating_sub(limit)) {
        print_log(log);
    }

    eprintln!(
        "\n[{} records: {} succeeded, {} failed]",
        logs.len(),
        succeeded,
        failed
    );

    Ok(())
}

/// Show resolved configuration
fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("Home:           {}", config.home.display());
    println!("Project root:   {}", config.project_root.display());
    println!("Store:          {}", config.store);
    if let Some(path) = config.store_path() {
        println!("Store path:     {}", path.display());
    }
    match &config.config_file {
        Some(path) => println!("Config file:    {}", path.display()),
        None => println!("Config file:    (none)"),
    }
    match config.runner.timeout {
        Some(timeout) => println!("Script timeout: {:?}", timeout),
        None => println!("Script timeout: (none)"),
    }
    let on_failure = if config.runner.continue_on_failure {
        "continue"
    } else {
        "stop"
    };
    println!("On failure:     {}", on_failure);
    println!("Scripts:        {}", config.scripts.len());
    for script in &config.scripts {
        println!("  {}: {}", script.name, script.command.join(" "));
    }

    Ok(())
}

fn print_report(report: &RunReport) {
    for outcome in &report.outcomes {
        match outcome {
            ScriptOutcome::Executed(log) if log.success => {
                println!("  ok       {} ({}ms)", log.script_name, log.runtime_ms)
            }
            ScriptOutcome::Executed(log) => println!(
                "  FAILED   {} ({}ms){}",
                log.script_name,
                log.runtime_ms,
                log.exception
                    .as_deref()
                    .map(|e| format!(": {}", e))
                    .unwrap_or_default()
            ),
            ScriptOutcome::AlreadyRun { script_name } => println!("  skipped  {}", script_name),
            ScriptOutcome::Invalid(log) => println!(
                "  invalid  {}",
                log.exception.as_deref().unwrap_or("invalid script")
            ),
        }
    }
    for name in &report.not_attempted {
        println!("  not run  {}", name);
    }

    eprintln!(
        "\n[{} executed: {} succeeded, {} failed, {} already run]",
        report.executed(),
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
}

fn print_log_header() {
    println!(
        "{:<38} {:<32} {:<8} {:>10}  {}",
        "ID", "SCRIPT", "RESULT", "RUNTIME", "TIMESTAMP"
    );
    println!("{}", "-".repeat(120));
}

fn print_log(log: &UpgradeLog) {
    println!(
        "{:<38} {:<32} {:<8} {:>8}ms  {}",
        log.id,
        log.script_name,
        if log.success { "ok" } else { "failed" },
        log.runtime_ms,
        log.timestamp.to_rfc3339()
    );
    if let Some(ref exception) = log.exception {
        println!("    {}", exception);
    }
}
