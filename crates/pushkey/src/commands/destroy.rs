//! Destroy command

use anyhow::Result;
use camino::Utf8Path;

use super::{apply, confirm, initialize, load_config, orchestrator, print_plan};
use crate::cli::{AwsArgs, DestroyArgs};
use crate::output;

pub async fn run(args: DestroyArgs, config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let config = load_config(config_path)?;
    let identity = config.identity().name.clone();

    let mut orch = orchestrator(config, aws).await;
    initialize(&mut orch).await?;

    let plan = orch.plan_destroy()?;
    if !plan.has_changes() {
        output::info("Nothing to destroy; the state file tracks no resources");
        return Ok(());
    }
    print_plan(plan);

    if !args.force {
        let prompt = format!(
            "Destroy '{}', its access key and both SSM parameters? CI pushes will stop working",
            identity
        );
        if !confirm(&prompt)? {
            output::info("Cancelled");
            return Ok(());
        }
    }

    output::header(&format!("Destroying {}", identity));
    let report = apply(&mut orch).await?;
    output::success(&format!("Destroyed {} resource(s)", report.steps.len()));

    Ok(())
}
