//! Plan command

use anyhow::{Context, Result};
use camino::Utf8Path;

use super::{initialize, load_config, orchestrator, print_plan};
use crate::cli::{AwsArgs, PlanArgs};
use crate::output;

pub async fn run(args: PlanArgs, config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let mut orch = orchestrator(config, aws).await;
    initialize(&mut orch).await?;

    let plan = if args.destroy {
        orch.plan_destroy()?
    } else {
        orch.plan()?
    };
    print_plan(plan);

    if let Some(out) = &args.out {
        plan.save(out)
            .with_context(|| format!("Failed to write plan to {}", out))?;
        output::info(&format!(
            "Saved plan to {}; run `pushkey apply {}` to apply exactly these changes",
            out, out
        ));
    }

    Ok(())
}
