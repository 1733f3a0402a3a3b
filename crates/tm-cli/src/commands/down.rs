//! Down command implementation

use anyhow::Result;
use tm_core::StepKey;
use tm_migrate::RollbackTarget;

use crate::cli::{DownArgs, GlobalArgs};
use crate::commands::common::{self, engine_failure};

/// Rollback target from `--to` / `--steps`
fn target(args: &DownArgs) -> RollbackTarget {
    match (args.to, args.steps) {
        (Some(key), _) => RollbackTarget::To(StepKey::new(key)),
        (None, Some(steps)) => RollbackTarget::Steps(steps),
        // clap requires one of the two
        (None, None) => RollbackTarget::Steps(0),
    }
}

/// Execute the down command
pub async fn execute(args: &DownArgs, global: &GlobalArgs) -> Result<()> {
    let session = common::open_session(global)?;
    let runner = session.runner;
    let target = target(args);

    if args.dry_run {
        let plan = runner.plan_down(target).await.map_err(engine_failure)?;
        common::print_plan(&plan);
        return Ok(());
    }

    common::cancel_on_ctrl_c(runner.cancel_token());
    let report = match target {
        RollbackTarget::To(key) => runner.run_down_to(key).await,
        RollbackTarget::Steps(steps) => runner.run_down(steps).await,
    }
    .map_err(engine_failure)?;

    if report.is_noop() {
        println!("Nothing to roll back.");
    } else {
        for key in &report.executed {
            println!("  Reverted {key}");
        }
        println!();
        println!("Reverted {} migration(s).", report.executed.len());
    }
    Ok(())
}
