//! Caller identity resolution via STS

use crate::traits::IdentityResolver;
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_sts::error::DisplayErrorContext;
use aws_sdk_sts::Client;
use pushkey_core::types::CallerIdentity;
use pushkey_core::{Error, Result};
use tracing::debug;

/// Resolves the caller with `sts:GetCallerIdentity`
pub struct StsIdentityResolver {
    client: Client,
    region: Option<String>,
}

impl StsIdentityResolver {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            region: sdk_config.region().map(|r| r.to_string()),
        }
    }
}

#[async_trait]
impl IdentityResolver for StsIdentityResolver {
    async fn resolve(&self) -> Result<CallerIdentity> {
        let region = self.region.clone().ok_or(Error::MissingRegion)?;

        let resp = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| Error::not_authenticated(DisplayErrorContext(&e).to_string()))?;

        let account = resp
            .account()
            .ok_or_else(|| Error::not_authenticated("GetCallerIdentity returned no account"))?;

        debug!("Resolved caller {} in account {}", resp.arn().unwrap_or("-"), account);

        Ok(CallerIdentity {
            account: account.to_string(),
            arn: resp.arn().unwrap_or_default().to_string(),
            user_id: resp.user_id().unwrap_or_default().to_string(),
            region,
        })
    }
}

impl std::fmt::Debug for StsIdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StsIdentityResolver")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
