//! In-memory control plane for tests
//!
//! Mimics the IAM, STS and SSM behaviour pushkey depends on: name collisions,
//! the two-keys-per-user limit, one-shot secret material, last-write-wins
//! parameters and idempotent deletes. Every call is recorded so tests can
//! assert on ordering.

use crate::traits::{
    tag_changes, IamBackend, IdentityResolver, IssuedKey, ManagedPolicy, PolicySpec, UserSpec,
};
use crate::Backends;
use async_trait::async_trait;
use pushkey_core::types::{CallerIdentity, ServiceIdentity};
use pushkey_core::{Error, Result};
use pushkey_secrets::{OneShotSecret, ParameterStore, PutParameter, SecureString};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// IAM allows two access keys per user
pub const MAX_ACCESS_KEYS_PER_USER: usize = 2;

/// Kind of failure to inject into the next matching call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    Conflict,
    Quota,
    Service,
}

/// A stored IAM user
#[derive(Debug, Clone)]
pub struct MemoryUser {
    pub identity: ServiceIdentity,
    pub attached_policies: Vec<String>,
    pub access_keys: Vec<String>,
}

/// A stored managed policy
#[derive(Debug, Clone)]
pub struct MemoryPolicy {
    pub name: String,
    pub path: String,
    pub description: String,
    pub versions: Vec<(String, String)>,
}

impl MemoryPolicy {
    /// Document of the default (latest) version
    pub fn document(&self) -> Option<&str> {
        self.versions.last().map(|(_, doc)| doc.as_str())
    }
}

/// A stored parameter
#[derive(Debug, Clone)]
pub struct MemoryParameter {
    pub value: SecureString,
    pub version: i64,
    pub kms_key_id: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    authenticated: bool,
    users: BTreeMap<String, MemoryUser>,
    policies: BTreeMap<String, MemoryPolicy>,
    parameters: BTreeMap<String, MemoryParameter>,
    failures: HashMap<String, InjectedFailure>,
    calls: Vec<String>,
}

/// In-memory IAM + STS + SSM
#[derive(Debug)]
pub struct InMemoryCloud {
    account: String,
    region: Option<String>,
    partition: String,
    inner: Mutex<Inner>,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new("123456789012", "us-east-1")
    }
}

impl InMemoryCloud {
    /// An authenticated session in the given account and region
    pub fn new(account: &str, region: &str) -> Self {
        Self {
            account: account.to_string(),
            region: Some(region.to_string()),
            partition: "aws".to_string(),
            inner: Mutex::new(Inner {
                authenticated: true,
                ..Default::default()
            }),
        }
    }

    /// A session without credentials
    pub fn unauthenticated() -> Self {
        let cloud = Self::default();
        cloud.lock().authenticated = false;
        cloud
    }

    /// A session with credentials but no region
    pub fn without_region() -> Self {
        Self {
            region: None,
            ..Self::default()
        }
    }

    /// Bundle this cloud as the three backends the engine needs
    pub fn backends(self: &Arc<Self>) -> Backends {
        Backends {
            resolver: self.clone(),
            iam: self.clone(),
            parameters: self.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("in-memory cloud mutex poisoned")
    }

    fn record(&self, call: String) -> Result<()> {
        let mut inner = self.lock();
        let operation = call.split('(').next().unwrap_or_default().to_string();
        inner.calls.push(call);
        match inner.failures.remove(&operation) {
            Some(InjectedFailure::Conflict) => Err(Error::conflict(
                operation,
                "EntityAlreadyExists: injected conflict",
            )),
            Some(InjectedFailure::Quota) => {
                Err(Error::quota_exceeded("LimitExceeded: injected quota failure"))
            }
            Some(InjectedFailure::Service) => Err(Error::cloud(
                operation,
                "ServiceFailure: injected service failure",
            )),
            None => Ok(()),
        }
    }

    /// Fail the next call to `operation` (e.g. `create_access_key`)
    pub fn fail_next(&self, operation: &str, failure: InjectedFailure) {
        self.lock().failures.insert(operation.to_string(), failure);
    }

    /// Simulate an IAM user created outside pushkey
    pub fn add_foreign_user(&self, name: &str) {
        let identity = ServiceIdentity {
            name: name.to_string(),
            path: "/".to_string(),
            arn: format!("arn:{}:iam::{}:user/{}", self.partition, self.account, name),
            unique_id: format!("AIDA{}", short_id()),
            tags: BTreeMap::new(),
        };
        self.lock().users.insert(
            name.to_string(),
            MemoryUser {
                identity,
                attached_policies: Vec::new(),
                access_keys: Vec::new(),
            },
        );
    }

    /// Recorded calls, in order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Names of recorded calls that mutate the control plane
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("resolve") && !c.starts_with("list_"))
            .collect()
    }

    pub fn user(&self, name: &str) -> Option<MemoryUser> {
        self.lock().users.get(name).cloned()
    }

    pub fn policy(&self, arn: &str) -> Option<MemoryPolicy> {
        self.lock().policies.get(arn).cloned()
    }

    pub fn parameter(&self, path: &str) -> Option<MemoryParameter> {
        self.lock().parameters.get(path).cloned()
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn policy_count(&self) -> usize {
        self.lock().policies.len()
    }

    pub fn parameter_count(&self) -> usize {
        self.lock().parameters.len()
    }

    fn policy_arn(&self, spec: &PolicySpec) -> String {
        format!(
            "arn:{}:iam::{}:policy{}{}",
            self.partition, self.account, spec.path, spec.name
        )
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_uppercase()
}

#[async_trait]
impl IdentityResolver for InMemoryCloud {
    async fn resolve(&self) -> Result<CallerIdentity> {
        self.record("resolve()".to_string())?;
        if !self.lock().authenticated {
            return Err(Error::not_authenticated(
                "Unable to locate credentials. You can configure credentials by running \"aws configure\".",
            ));
        }
        let region = self.region.clone().ok_or(Error::MissingRegion)?;
        Ok(CallerIdentity {
            account: self.account.clone(),
            arn: format!("arn:{}:iam::{}:user/operator", self.partition, self.account),
            user_id: "AIDAOPERATOR".to_string(),
            region,
        })
    }
}

#[async_trait]
impl IamBackend for InMemoryCloud {
    async fn create_policy(&self, spec: &PolicySpec) -> Result<ManagedPolicy> {
        self.record(format!("create_policy({})", spec.name))?;
        let arn = self.policy_arn(spec);
        let mut inner = self.lock();
        if inner.policies.contains_key(&arn) {
            return Err(Error::conflict(
                format!("IAM policy {}", spec.name),
                format!(
                    "EntityAlreadyExists: A policy called {} already exists.",
                    spec.name
                ),
            ));
        }
        inner.policies.insert(
            arn.clone(),
            MemoryPolicy {
                name: spec.name.clone(),
                path: spec.path.clone(),
                description: spec.description.clone(),
                versions: vec![("v1".to_string(), spec.document.clone())],
            },
        );
        Ok(ManagedPolicy {
            arn,
            name: spec.name.clone(),
            path: spec.path.clone(),
            default_version_id: "v1".to_string(),
        })
    }

    async fn update_policy_document(&self, policy_arn: &str, document: &str) -> Result<String> {
        self.record(format!("update_policy_document({})", policy_arn))?;
        let mut inner = self.lock();
        let policy = inner.policies.get_mut(policy_arn).ok_or_else(|| {
            Error::cloud("iam:CreatePolicyVersion", format!("NoSuchEntity: {}", policy_arn))
        })?;
        if policy.versions.len() >= 5 {
            policy.versions.remove(0);
        }
        let next = policy
            .versions
            .last()
            .and_then(|(id, _)| id.trim_start_matches('v').parse::<u32>().ok())
            .unwrap_or(0)
            + 1;
        let version_id = format!("v{}", next);
        policy
            .versions
            .push((version_id.clone(), document.to_string()));
        Ok(version_id)
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        self.record(format!("delete_policy({})", policy_arn))?;
        let mut inner = self.lock();
        let attached = inner
            .users
            .values()
            .any(|u| u.attached_policies.iter().any(|p| p == policy_arn));
        if attached {
            return Err(Error::cloud(
                "iam:DeletePolicy",
                "DeleteConflict: Cannot delete a policy attached to entities.",
            ));
        }
        inner.policies.remove(policy_arn);
        Ok(())
    }

    async fn create_user(&self, spec: &UserSpec) -> Result<ServiceIdentity> {
        self.record(format!("create_user({})", spec.name))?;
        let mut inner = self.lock();
        if inner.users.contains_key(&spec.name) {
            return Err(Error::conflict(
                format!("IAM user {}", spec.name),
                format!(
                    "EntityAlreadyExists: User with name {} already exists.",
                    spec.name
                ),
            ));
        }
        let identity = ServiceIdentity {
            name: spec.name.clone(),
            path: spec.path.clone(),
            arn: format!(
                "arn:{}:iam::{}:user{}{}",
                self.partition, self.account, spec.path, spec.name
            ),
            unique_id: format!("AIDA{}", short_id()),
            tags: spec.tags.clone(),
        };
        inner.users.insert(
            spec.name.clone(),
            MemoryUser {
                identity: identity.clone(),
                attached_policies: Vec::new(),
                access_keys: Vec::new(),
            },
        );
        Ok(identity)
    }

    async fn update_user_tags(
        &self,
        user_name: &str,
        current: &BTreeMap<String, String>,
        desired: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.record(format!("update_user_tags({})", user_name))?;
        let (removed, upserted) = tag_changes(current, desired);
        let mut inner = self.lock();
        let user = inner
            .users
            .get_mut(user_name)
            .ok_or_else(|| Error::cloud("iam:TagUser", format!("NoSuchEntity: {}", user_name)))?;
        for key in removed {
            user.identity.tags.remove(&key);
        }
        user.identity.tags.extend(upserted);
        Ok(())
    }

    async fn delete_user(&self, user_name: &str) -> Result<()> {
        self.record(format!("delete_user({})", user_name))?;
        let mut inner = self.lock();
        if let Some(user) = inner.users.get(user_name) {
            if !user.attached_policies.is_empty() || !user.access_keys.is_empty() {
                return Err(Error::cloud(
                    "iam:DeleteUser",
                    "DeleteConflict: Cannot delete entity, must delete access keys and detach policies first.",
                ));
            }
        }
        inner.users.remove(user_name);
        Ok(())
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        self.record(format!("attach_user_policy({}, {})", user_name, policy_arn))?;
        let mut inner = self.lock();
        if !inner.policies.contains_key(policy_arn) {
            return Err(Error::cloud(
                "iam:AttachUserPolicy",
                format!("NoSuchEntity: Policy {} does not exist", policy_arn),
            ));
        }
        let user = inner.users.get_mut(user_name).ok_or_else(|| {
            Error::cloud("iam:AttachUserPolicy", format!("NoSuchEntity: {}", user_name))
        })?;
        if !user.attached_policies.iter().any(|p| p == policy_arn) {
            user.attached_policies.push(policy_arn.to_string());
        }
        Ok(())
    }

    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        self.record(format!("detach_user_policy({}, {})", user_name, policy_arn))?;
        if let Some(user) = self.lock().users.get_mut(user_name) {
            user.attached_policies.retain(|p| p != policy_arn);
        }
        Ok(())
    }

    async fn create_access_key(&self, user_name: &str) -> Result<IssuedKey> {
        self.record(format!("create_access_key({})", user_name))?;
        let mut inner = self.lock();
        let user = inner.users.get_mut(user_name).ok_or_else(|| {
            Error::cloud("iam:CreateAccessKey", format!("NoSuchEntity: {}", user_name))
        })?;
        if user.access_keys.len() >= MAX_ACCESS_KEYS_PER_USER {
            return Err(Error::quota_exceeded(format!(
                "LimitExceeded: Cannot exceed quota for AccessKeysPerUser: {}",
                MAX_ACCESS_KEYS_PER_USER
            )));
        }

        let access_key_id = format!("AKIA{}", short_id());
        let secret = format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        user.access_keys.push(access_key_id.clone());

        Ok(IssuedKey {
            secret: OneShotSecret::new(access_key_id.clone(), SecureString::new(secret)),
            access_key_id,
            user_name: user_name.to_string(),
            created_at: chrono::Utc::now(),
        })
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()> {
        self.record(format!("delete_access_key({}, {})", user_name, access_key_id))?;
        if let Some(user) = self.lock().users.get_mut(user_name) {
            user.access_keys.retain(|k| k != access_key_id);
        }
        Ok(())
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>> {
        self.record(format!("list_access_keys({})", user_name))?;
        Ok(self
            .lock()
            .users
            .get(user_name)
            .map(|u| u.access_keys.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ParameterStore for InMemoryCloud {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put_secure(&self, request: &PutParameter<'_>) -> Result<i64> {
        self.record(format!("put_parameter({})", request.path))?;
        let mut inner = self.lock();
        let version = inner
            .parameters
            .get(request.path)
            .map(|p| p.version + 1)
            .unwrap_or(1);
        inner.parameters.insert(
            request.path.to_string(),
            MemoryParameter {
                value: request.value.clone(),
                version,
                kms_key_id: request.kms_key_id.map(str::to_string),
            },
        );
        Ok(version)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.record(format!("delete_parameter({})", path))?;
        self.lock().parameters.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_spec(name: &str) -> UserSpec {
        UserSpec {
            name: name.to_string(),
            path: "/ci-cd/".to_string(),
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_access_key_limit() {
        let cloud = InMemoryCloud::default();
        cloud.create_user(&user_spec("ci")).await.unwrap();
        cloud.create_access_key("ci").await.unwrap();
        cloud.create_access_key("ci").await.unwrap();

        let err = cloud.create_access_key("ci").await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { .. }));
        assert!(err.to_string().contains("AccessKeysPerUser"));
    }

    #[tokio::test]
    async fn test_foreign_user_conflicts() {
        let cloud = InMemoryCloud::default();
        cloud.add_foreign_user("ci");
        let err = cloud.create_user(&user_spec("ci")).await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let cloud = InMemoryCloud::default();
        cloud.fail_next("create_user", InjectedFailure::Service);
        assert!(cloud.create_user(&user_spec("ci")).await.is_err());
        assert!(cloud.create_user(&user_spec("ci")).await.is_ok());
    }
}
