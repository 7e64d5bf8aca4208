//! Init command

use anyhow::{bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use pushkey_cloud::{aws_backends, resolve_caller};
use pushkey_core::config::generate_default_config;
use pushkey_core::PushkeyConfig;
use pushkey_engine::StateStore;

use super::aws_context;
use crate::cli::{AwsArgs, InitArgs};
use crate::output;

pub async fn run(args: InitArgs, config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let path = config_path
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| Utf8PathBuf::from("pushkey.yaml"));

    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path);
    }

    // Nothing is written until the session is known to work
    let spinner = output::spinner("Verifying AWS credentials...");
    let backends = aws_backends(&aws_context(None, aws)).await;
    let caller = resolve_caller(backends.resolver.as_ref()).await;
    spinner.finish_and_clear();

    let caller = caller.context(
        "Unable to verify AWS credentials; configure them (e.g. `aws configure`) and rerun init",
    )?;
    output::success(&format!(
        "Authenticated as {} (account {}, {})",
        caller.arn, caller.account, caller.region
    ));

    let region = aws.region.as_deref().unwrap_or(caller.region.as_str());
    write_workspace(&path, region)?;
    output::info("Run `pushkey plan` to preview, then `pushkey deploy`");
    Ok(())
}

/// Write pushkey.yaml pinned to `region` and create its state directory
fn write_workspace(path: &Utf8Path, region: &str) -> Result<()> {
    let content = generate_default_config(Some(region))?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path))?;
    output::success(&format!("Created {}", path));

    let config = PushkeyConfig::load(Some(path))?;
    let store = StateStore::new(config.state_dir());
    store
        .ensure_dir()
        .with_context(|| format!("Failed to create state directory {}", store.dir()))?;
    output::success(&format!("State directory {}", store.dir()));
    Ok(())
}
