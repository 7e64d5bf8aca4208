//! Cloud control plane adapters for pushkey
//!
//! The engine provisions through three seams:
//! - [`IdentityResolver`]: who is calling, in which account and region
//! - [`IamBackend`]: policy, identity, attachment and access key lifecycle
//! - [`ParameterStore`]: encrypted parameter publication (from `pushkey-secrets`)
//!
//! [`aws_backends`] wires all three to the AWS SDK from one explicit
//! [`AwsContext`].

pub mod aws;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod traits;

pub use aws::{AwsContext, AwsIamBackend, StsIdentityResolver};
pub use traits::{
    tag_changes, IamBackend, IdentityResolver, IssuedKey, ManagedPolicy, PolicySpec, UserSpec,
};

use pushkey_core::types::CallerIdentity;
use pushkey_core::{Error, Result};
use pushkey_secrets::{ParameterStore, SsmParameterStore};
use std::sync::Arc;
use tracing::info;

/// The control plane handles a run needs
#[derive(Clone)]
pub struct Backends {
    pub resolver: Arc<dyn IdentityResolver>,
    pub iam: Arc<dyn IamBackend>,
    pub parameters: Arc<dyn ParameterStore>,
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends")
            .field("parameters", &self.parameters.name())
            .finish_non_exhaustive()
    }
}

/// Build AWS SDK backed handles sharing one session
pub async fn aws_backends(context: &AwsContext) -> Backends {
    let sdk_config = context.load_sdk_config().await;
    Backends {
        resolver: Arc::new(StsIdentityResolver::new(&sdk_config)),
        iam: Arc::new(AwsIamBackend::new(&sdk_config)),
        parameters: Arc::new(SsmParameterStore::new(&sdk_config)),
    }
}

/// Resolve and sanity-check the caller before anything is mutated
pub async fn resolve_caller(resolver: &dyn IdentityResolver) -> Result<CallerIdentity> {
    let caller = resolver.resolve().await?;

    if caller.account.len() != 12 || !caller.account.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::not_authenticated(format!(
            "caller account '{}' is not a 12-digit account id",
            caller.account
        )));
    }
    if caller.region.trim().is_empty() {
        return Err(Error::MissingRegion);
    }

    info!(
        "Authenticated as {} (account {}, region {})",
        caller.arn, caller.account, caller.region
    );
    Ok(caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockIdentityResolver;

    fn caller(account: &str, region: &str) -> CallerIdentity {
        CallerIdentity {
            account: account.to_string(),
            arn: format!("arn:aws:iam::{}:user/operator", account),
            user_id: "AIDAEXAMPLE".to_string(),
            region: region.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_caller_ok() {
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_resolve()
            .times(1)
            .returning(|| Ok(caller("123456789012", "eu-west-1")));

        let resolved = resolve_caller(&resolver).await.unwrap();
        assert_eq!(resolved.account, "123456789012");
        assert_eq!(resolved.region, "eu-west-1");
    }

    #[tokio::test]
    async fn test_resolve_caller_propagates_auth_failure() {
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_resolve()
            .returning(|| Err(Error::not_authenticated("ExpiredToken")));

        let err = resolve_caller(&resolver).await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated { .. }));
        assert!(err.to_string().contains("ExpiredToken"));
    }

    #[tokio::test]
    async fn test_resolve_caller_rejects_malformed_account() {
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_resolve()
            .returning(|| Ok(caller("12345", "us-east-1")));

        assert!(matches!(
            resolve_caller(&resolver).await,
            Err(Error::NotAuthenticated { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_caller_rejects_blank_region() {
        let mut resolver = MockIdentityResolver::new();
        resolver
            .expect_resolve()
            .returning(|| Ok(caller("123456789012", " ")));

        assert!(matches!(
            resolve_caller(&resolver).await,
            Err(Error::MissingRegion)
        ));
    }

    #[tokio::test]
    async fn test_memory_backends_share_state() {
        let cloud = Arc::new(memory::InMemoryCloud::default());
        let backends = cloud.backends();
        let resolved = resolve_caller(backends.resolver.as_ref()).await.unwrap();
        assert_eq!(resolved.account, "123456789012");
        assert_eq!(cloud.calls(), vec!["resolve()"]);
    }
}
