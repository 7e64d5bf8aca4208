//! CLI command implementations

pub mod apply;
pub mod completions;
pub mod deploy;
pub mod destroy;
pub mod init;
pub mod outputs;
pub mod plan;
pub mod policy;
pub mod state;

use anyhow::{Context, Result};
use camino::Utf8Path;
use console::style;
use pushkey_cloud::{aws_backends, AwsContext};
use pushkey_core::PushkeyConfig;
use pushkey_engine::{Action, ApplyReport, Orchestrator, Outputs, Plan};

use crate::cli::AwsArgs;
use crate::output;

/// Load pushkey.yaml from `path` or by searching upwards
pub(crate) fn load_config(path: Option<&Utf8Path>) -> Result<PushkeyConfig> {
    PushkeyConfig::load(path).context("Failed to load pushkey configuration")
}

/// Session parameters: flags and env first, then pushkey.yaml
pub(crate) fn aws_context(config: Option<&PushkeyConfig>, aws: &AwsArgs) -> AwsContext {
    AwsContext::new(
        aws.region
            .clone()
            .or_else(|| config.and_then(|c| c.region()).map(str::to_string)),
        aws.profile
            .clone()
            .or_else(|| config.and_then(|c| c.profile()).map(str::to_string)),
    )
}

/// Orchestrator wired to the AWS SDK
pub(crate) async fn orchestrator(config: PushkeyConfig, aws: &AwsArgs) -> Orchestrator {
    let context = aws_context(Some(&config), aws);
    let backends = aws_backends(&context).await;
    Orchestrator::new(config, backends)
}

/// Verify credentials and open state, with progress
pub(crate) async fn initialize(orch: &mut Orchestrator) -> Result<()> {
    let spinner = output::spinner("Verifying AWS credentials...");
    let result = orch.initialize().await.cloned();
    spinner.finish_and_clear();

    let caller = result.context("Unable to verify AWS credentials; nothing was changed")?;
    output::success(&format!(
        "Authenticated as {} (account {}, {})",
        caller.arn, caller.account, caller.region
    ));
    Ok(())
}

/// Apply the orchestrator's plan, with progress
pub(crate) async fn apply(orch: &mut Orchestrator) -> Result<ApplyReport> {
    let spinner = output::spinner("Applying changes...");
    let result = orch.apply().await.cloned();
    spinner.finish_and_clear();

    match result {
        Ok(report) => Ok(report),
        Err(e) => {
            output::error("Apply stopped; the state file records every completed step");
            Err(e).context("Apply failed")
        }
    }
}

/// Ask before changing anything
pub(crate) fn confirm(prompt: &str) -> Result<bool> {
    Ok(dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

/// Render a plan as one line per change
pub(crate) fn print_plan(plan: &Plan) {
    if !plan.has_changes() {
        output::success("No changes. Provisioned resources match the configuration.");
        return;
    }

    output::header("Planned changes");
    for line in plan_lines(plan) {
        println!("{}", line);
    }
    println!();
    output::info(&format!("Plan: {}", plan.summary()));
}

pub(crate) fn plan_lines(plan: &Plan) -> Vec<String> {
    plan.changes
        .iter()
        .filter(|c| c.action != Action::NoOp)
        .map(|change| {
            let mut line = format!(
                "  {} {} ({})",
                output::action_symbol(change.action),
                change.node,
                style(change.node.kind()).dim()
            );
            if !change.changed_attributes.is_empty() {
                line.push_str(&format!(": {}", change.changed_attributes.join(", ")));
            }
            if let Some(parent) = change.forced_by {
                line.push_str(&format!(" [forced by {}]", parent));
            }
            line
        })
        .collect()
}

/// Operator instructions for wiring the credentials into GitHub Actions
pub(crate) fn print_instructions(outputs: &Outputs, region: Option<&str>) {
    output::header("Provisioned");
    for name in [
        "user_arn",
        "policy_arn",
        "access_key_id",
        "access_key_id_parameter",
        "secret_access_key_parameter",
    ] {
        if let Some(out) = outputs.get(name) {
            // The key id identifies the credential the operator just created
            output::output_value(out, name == "access_key_id");
        }
    }

    output::header("Next steps");
    println!("Add these repository secrets in GitHub (Settings > Secrets and variables > Actions):");
    output::github_secret("AWS_ACCESS_KEY_ID", "pushkey output access_key_id --raw");
    output::github_secret(
        "AWS_SECRET_ACCESS_KEY",
        "pushkey output secret_access_key --raw",
    );
    if let Some(region) = region {
        output::github_secret("AWS_REGION", region);
    }
    if let Some(path) = outputs.get("secret_access_key_parameter") {
        println!();
        output::info(&format!(
            "The key pair is also stored encrypted in SSM: aws ssm get-parameter --name {} --with-decryption",
            path.display_value()
        ));
    }
}
