//! Deploy command

use anyhow::Result;
use camino::Utf8Path;

use super::{apply, initialize, load_config, orchestrator, print_instructions, print_plan};
use crate::cli::AwsArgs;
use crate::output;

pub async fn run(config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let config = load_config(config_path)?;

    output::header(&format!(
        "Deploying CI push credentials for {}",
        config.identity().name
    ));

    let mut orch = orchestrator(config, aws).await;
    initialize(&mut orch).await?;

    let plan = orch.plan()?;
    print_plan(plan);
    let changed = plan.has_changes();

    let report = apply(&mut orch).await?;
    if changed {
        output::success(&format!("Applied {} change(s)", report.steps.len()));
    }

    // Reporting never fails the run
    let region = orch.caller().map(|c| c.region.clone());
    match orch.report() {
        Ok(Some(outputs)) => print_instructions(&outputs, region.as_deref()),
        Ok(None) => output::warning("Outputs unavailable; run `pushkey output` to retry"),
        Err(e) => tracing::warn!("Skipping report: {}", e),
    }

    Ok(())
}
