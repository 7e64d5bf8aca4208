//! Policy command
//!
//! Renders the registry push policy. With `--account` and a region it works
//! offline; otherwise the account comes from the caller identity.

use anyhow::{Context, Result};
use camino::Utf8Path;
use pushkey_cloud::{aws_backends, resolve_caller};
use pushkey_core::types::partition_for_region;
use pushkey_core::{PolicyBuilder, PushkeyConfig};

use super::{aws_context, load_config};
use crate::cli::{AwsArgs, PolicyArgs};

pub async fn run(args: PolicyArgs, config_path: Option<&Utf8Path>, aws: &AwsArgs) -> Result<()> {
    let config = match config_path {
        Some(_) => Some(load_config(config_path)?),
        None => PushkeyConfig::load(None).ok(),
    };
    let context = aws_context(config.as_ref(), aws);

    let builder = match (args.account, context.region.clone()) {
        (Some(account), Some(region)) => {
            let partition = partition_for_region(&region);
            PolicyBuilder::new(account, region).with_partition(partition)
        }
        (account, _) => {
            let backends = aws_backends(&context).await;
            let caller = resolve_caller(backends.resolver.as_ref())
                .await
                .context("Unable to resolve the caller; pass --account and --region to render offline")?;
            let partition = caller.partition();
            PolicyBuilder::new(account.unwrap_or(caller.account), caller.region)
                .with_partition(partition)
        }
    };

    let document = builder.build()?;
    println!("{}", document.to_json_pretty()?);
    Ok(())
}
