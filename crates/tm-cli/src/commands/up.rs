//! Up command implementation

use anyhow::Result;

use crate::cli::{GlobalArgs, UpArgs};
use crate::commands::common::{self, engine_failure};

/// Execute the up command
pub async fn execute(args: &UpArgs, global: &GlobalArgs) -> Result<()> {
    let session = common::open_session(global)?;
    let runner = session.runner;

    if args.dry_run {
        let plan = runner.plan_up().await.map_err(engine_failure)?;
        common::print_plan(&plan);
        return Ok(());
    }

    common::cancel_on_ctrl_c(runner.cancel_token());
    let report = runner.run_up().await.map_err(engine_failure)?;

    if report.is_noop() {
        println!("Database '{}' is up to date.", session.config.name);
    } else {
        for key in &report.executed {
            println!("  Applied {key}");
        }
        println!();
        println!("Applied {} migration(s).", report.executed.len());
    }
    Ok(())
}
