//! Unlock command implementation

use anyhow::Result;
use chrono::Utc;

use crate::cli::{GlobalArgs, UnlockArgs};
use crate::commands::common::{self, engine_failure, ExitCode};

/// Execute the unlock command
///
/// Without `--force` only a stale lock is removed.
pub async fn execute(args: &UnlockArgs, global: &GlobalArgs) -> Result<()> {
    let session = common::open_session(global)?;
    let lock = session.runner.lock();

    let Some(current) = lock.current().await.map_err(engine_failure)? else {
        println!("No migration lock is held.");
        return Ok(());
    };

    let stale_after = session.config.lock_stale_after();
    if !args.force && !current.is_stale(Utc::now(), stale_after) {
        eprintln!(
            "Lock is held by '{}' since {} and is not stale yet (timeout {}s).",
            current.owner,
            current.acquired_at,
            stale_after.as_secs()
        );
        eprintln!("Use --force if that runner is known to be dead.");
        return Err(ExitCode(2).into());
    }

    match lock.force_release().await.map_err(engine_failure)? {
        Some(removed) => println!(
            "Removed migration lock held by '{}' since {}.",
            removed.owner, removed.acquired_at
        ),
        None => println!("No migration lock is held."),
    }
    Ok(())
}
