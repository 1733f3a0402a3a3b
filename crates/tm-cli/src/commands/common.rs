//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tm_core::{Config, Registry};
use tm_db::{DocumentStore, DuckDbStore};
use tm_migrate::{CancelToken, MigrateError, Plan, Runner, RunnerOptions};

use crate::cli::GlobalArgs;
use crate::migrations;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; the command has already reported the failure.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Process exit code for an engine error
pub(crate) fn exit_code_for(err: &MigrateError) -> i32 {
    match err {
        MigrateError::LockContention { .. }
        | MigrateError::LockNotHeld { .. }
        | MigrateError::StoreBusy(_) => 2,
        MigrateError::IrreversibleStep { .. } | MigrateError::UnknownAppliedStep { .. } => 3,
        MigrateError::StoreUnavailable(_) => 4,
        MigrateError::StepFailed { .. } => 5,
        MigrateError::Cancelled { .. } => 6,
        MigrateError::Store(_)
        | MigrateError::CorruptRecord { .. }
        | MigrateError::Registry(_) => 1,
    }
}

/// Report an engine error on stderr and turn it into an exit code.
pub(crate) fn engine_failure(err: MigrateError) -> anyhow::Error {
    let code = exit_code_for(&err);
    eprintln!("Error: {}", error_chain(&err));
    ExitCode(code).into()
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Load tidemark.yml from the project directory.
pub(crate) fn load_config(global: &GlobalArgs) -> Result<Config> {
    Config::load_from_dir(Path::new(&global.project_dir)).context("Failed to load configuration")
}

/// Database path after CLI and environment overrides, relative paths
/// resolved against the project directory.
pub(crate) fn database_path(config: &Config, global: &GlobalArgs) -> String {
    let path = config.resolve_database_path(global.database.as_deref());
    if path == ":memory:" || Path::new(&path).is_absolute() {
        return path;
    }
    PathBuf::from(&global.project_dir)
        .join(path)
        .to_string_lossy()
        .into_owned()
}

/// Open the target store named by the configuration.
///
/// Open failures go through [`engine_failure`] so an unreachable store exits
/// with the store-unavailable code and a locked file with the busy code.
pub(crate) fn open_store(config: &Config, global: &GlobalArgs) -> Result<Arc<dyn DocumentStore>> {
    let path = database_path(config, global);
    log::debug!("Opening database {path}");
    let store = DuckDbStore::open(&path, config.database_busy_timeout())
        .map_err(|e| engine_failure(MigrateError::from(e)))?;
    Ok(Arc::new(store))
}

/// Registry holding every migration compiled into this binary.
pub(crate) fn build_registry() -> Result<Arc<Registry>> {
    let registry = Registry::new();
    migrations::register_all(&registry).context("Failed to register migrations")?;
    Ok(Arc::new(registry))
}

/// Config, runner, and store for one invocation
pub(crate) struct Session {
    pub(crate) config: Config,
    pub(crate) database: String,
    pub(crate) runner: Runner,
}

pub(crate) fn open_session(global: &GlobalArgs) -> Result<Session> {
    let config = load_config(global)?;
    let database = database_path(&config, global);
    let store = open_store(&config, global)?;
    let registry = build_registry()?;

    let mut options = RunnerOptions::from_config(&config);
    if let Some(prefix) = &global.owner_prefix {
        options.owner_prefix = Some(prefix.clone());
    }
    let runner = Runner::with_options(registry, store, options);
    log::debug!("Runner owner: {}", runner.owner());

    Ok(Session {
        config,
        database,
        runner,
    })
}

/// Cancel `token` on Ctrl-C. The step in flight still runs to completion.
pub(crate) fn cancel_on_ctrl_c(token: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping after the current step");
            token.cancel();
        }
    });
}

/// Print a plan for `--dry-run`.
pub(crate) fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("Nothing to run ({}).", plan.direction());
        return;
    }
    println!("Would run {} step(s) {}:", plan.len(), plan.direction());
    for step in plan.steps() {
        println!("  {:>6}  {}", step.key(), step.description());
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
