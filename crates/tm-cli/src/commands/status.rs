//! Status command implementation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tm_migrate::{FailureRecord, Status};

use crate::cli::{GlobalArgs, StatusArgs};
use crate::commands::common::{self, engine_failure};

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let session = common::open_session(global)?;
    let status = session.runner.status().await.map_err(engine_failure)?;

    if args.json {
        let json = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "Migrations for '{}' ({})",
        session.config.name, session.database
    );
    println!();
    for line in status_lines(&status) {
        println!("{line}");
    }
    Ok(())
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn failure_note(failure: &FailureRecord) -> String {
    format!(
        "last {} failed at {}: {}",
        failure.direction,
        timestamp(&failure.failed_at),
        failure.cause
    )
}

/// Table rows plus summary, one string per output line
fn status_lines(status: &Status) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "  {:<8} {:>6}  {:<32} {}",
        "STATE", "KEY", "DESCRIPTION", "DETAIL"
    ));

    for step in &status.applied {
        let mut detail = format!("applied {}", timestamp(&step.applied_at));
        if !step.reversible {
            detail.push_str(", irreversible");
        }
        if let Some(failure) = &step.last_failure {
            detail.push_str(&format!(", {}", failure_note(failure)));
        }
        lines.push(format!(
            "  {:<8} {:>6}  {:<32} {}",
            "applied", step.key, step.description, detail
        ));
    }
    for step in &status.pending {
        let detail = step
            .last_failure
            .as_ref()
            .map(failure_note)
            .unwrap_or_default();
        lines.push(format!(
            "  {:<8} {:>6}  {:<32} {}",
            "pending", step.key, step.description, detail
        ));
    }
    for entry in &status.unknown {
        let detail = format!("applied {}, not in this binary", timestamp(&entry.applied_at));
        lines.push(format!(
            "  {:<8} {:>6}  {:<32} {}",
            "unknown", entry.key, entry.description, detail
        ));
    }

    lines.push(String::new());
    lines.push(match &status.lock {
        Some(lock) => format!(
            "Lock: held by '{}' since {}",
            lock.owner,
            timestamp(&lock.acquired_at)
        ),
        None => "Lock: free".to_string(),
    });
    lines.push(format!(
        "{} applied, {} pending, {} unknown",
        status.applied.len(),
        status.pending.len(),
        status.unknown.len()
    ));
    lines
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
