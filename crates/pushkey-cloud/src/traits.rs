//! Control plane trait definitions
//!
//! The engine talks to the cloud only through these traits. Each backend is
//! constructed from an explicit [`crate::AwsContext`] rather than ambient
//! process state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pushkey_core::types::{CallerIdentity, ServiceIdentity};
use pushkey_core::Result;
use pushkey_secrets::OneShotSecret;
use std::collections::BTreeMap;

/// Resolves the principal behind the ambient session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolve account, caller ARN and region
    ///
    /// Fails with `NotAuthenticated` when the session has no usable credentials
    /// and `MissingRegion` when no region can be determined.
    async fn resolve(&self) -> Result<CallerIdentity>;
}

/// Desired shape of the CI identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    pub path: String,
    pub tags: BTreeMap<String, String>,
}

/// Desired shape of the managed policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySpec {
    pub name: String,
    pub path: String,
    pub description: String,
    /// Policy document JSON
    pub document: String,
}

/// A managed policy as created by IAM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedPolicy {
    pub arn: String,
    pub name: String,
    pub path: String,
    pub default_version_id: String,
}

/// A freshly issued access key
///
/// The secret half is only available here, once.
#[derive(Debug)]
pub struct IssuedKey {
    pub access_key_id: String,
    pub user_name: String,
    pub created_at: DateTime<Utc>,
    pub secret: OneShotSecret,
}

/// IAM operations needed to provision the CI identity
///
/// Create operations fail with `Conflict` when the name is already taken and
/// never adopt the existing entity. Delete operations treat a missing entity
/// as success so that teardown can be re-run.
#[async_trait]
pub trait IamBackend: Send + Sync {
    /// Create a managed policy
    async fn create_policy(&self, spec: &PolicySpec) -> Result<ManagedPolicy>;

    /// Publish a new default document version, returning its version id
    async fn update_policy_document(&self, policy_arn: &str, document: &str) -> Result<String>;

    /// Delete a managed policy and all of its versions
    async fn delete_policy(&self, policy_arn: &str) -> Result<()>;

    /// Create the service identity
    async fn create_user(&self, spec: &UserSpec) -> Result<ServiceIdentity>;

    /// Reconcile tags on an existing identity
    async fn update_user_tags(
        &self,
        user_name: &str,
        current: &BTreeMap<String, String>,
        desired: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Delete the service identity
    async fn delete_user(&self, user_name: &str) -> Result<()>;

    /// Attach a managed policy to the identity
    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()>;

    /// Detach a managed policy from the identity
    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()>;

    /// Issue a new access key; fails with `QuotaExceeded` at the per-user limit
    async fn create_access_key(&self, user_name: &str) -> Result<IssuedKey>;

    /// Revoke an access key
    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()>;

    /// Ids of the access keys currently issued to the identity
    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>>;
}

/// Tag keys to remove and tags to set to move from `current` to `desired`
pub fn tag_changes(
    current: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> (Vec<String>, BTreeMap<String, String>) {
    let removed = current
        .keys()
        .filter(|k| !desired.contains_key(*k))
        .cloned()
        .collect();
    let upserted = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    (removed, upserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tag_changes() {
        let current = tags(&[("Purpose", "ci"), ("Owner", "ops"), ("Team", "web")]);
        let desired = tags(&[("Purpose", "ci"), ("Owner", "platform"), ("Env", "prod")]);

        let (removed, upserted) = tag_changes(&current, &desired);
        assert_eq!(removed, vec!["Team"]);
        assert_eq!(upserted, tags(&[("Owner", "platform"), ("Env", "prod")]));
    }

    #[test]
    fn test_tag_changes_noop() {
        let current = tags(&[("Purpose", "ci")]);
        let (removed, upserted) = tag_changes(&current, &current);
        assert!(removed.is_empty());
        assert!(upserted.is_empty());
    }
}
