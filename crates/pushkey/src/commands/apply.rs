//! Apply command

use anyhow::{Context, Result};
use camino::Utf8Path;
use pushkey_engine::Plan;

use super::{confirm, initialize, load_config, orchestrator, print_instructions, print_plan};
use crate::cli::{ApplyArgs, AwsArgs};
use crate::output;

pub async fn run(args: ApplyArgs, config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let mut orch = orchestrator(config, aws).await;
    initialize(&mut orch).await?;

    // A saved plan was already reviewed, so it is applied without a prompt
    let plan = match &args.plan_file {
        Some(path) => {
            let saved = Plan::load(path)
                .with_context(|| format!("Failed to read plan from {}", path))?;
            orch.use_plan(saved)?
        }
        None => orch.plan()?,
    };
    print_plan(plan);

    if !plan.has_changes() {
        return Ok(());
    }
    let destroy = plan.destroy;

    if args.plan_file.is_none() && !args.auto_approve && !confirm("Apply these changes?")? {
        output::info("Cancelled");
        return Ok(());
    }

    let report = super::apply(&mut orch).await?;
    output::success(&format!("Applied {} change(s)", report.steps.len()));

    if !destroy {
        let region = orch.caller().map(|c| c.region.clone());
        match orch.report() {
            Ok(Some(outputs)) => print_instructions(&outputs, region.as_deref()),
            Ok(None) => output::warning("Outputs unavailable; run `pushkey output` to retry"),
            Err(e) => tracing::warn!("Skipping report: {}", e),
        }
    }

    Ok(())
}
