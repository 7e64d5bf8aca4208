//! AWS SDK backed adapters

pub mod iam;
pub mod sts;

pub use iam::AwsIamBackend;
pub use sts::StsIdentityResolver;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_sts::config::Region;
use tracing::debug;

/// Explicit session parameters for every AWS client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AwsContext {
    /// Region override; `None` defers to the SDK's region provider chain
    pub region: Option<String>,

    /// Named profile; `None` defers to the SDK's default chain
    pub profile: Option<String>,
}

impl AwsContext {
    pub fn new(region: Option<String>, profile: Option<String>) -> Self {
        Self { region, profile }
    }

    /// Load SDK configuration for this context
    pub async fn load_sdk_config(&self) -> SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &self.region {
            debug!("Using region override: {}", region);
            loader = loader.region(Region::new(region.clone()));
        }

        if let Some(profile) = &self.profile {
            debug!("Using AWS profile: {}", profile);
            loader = loader.profile_name(profile);
        }

        loader.load().await
    }
}
