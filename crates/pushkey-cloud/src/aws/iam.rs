//! IAM provisioning via the AWS SDK
//!
//! Service errors are reported with the SDK's full error context so the
//! operator sees IAM's own message. Only two error codes are reclassified:
//! `EntityAlreadyExists` becomes `Conflict` and `LimitExceeded` becomes
//! `QuotaExceeded`.

use crate::traits::{tag_changes, IamBackend, IssuedKey, ManagedPolicy, PolicySpec, UserSpec};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_iam::error::DisplayErrorContext;
use aws_sdk_iam::types::Tag;
use aws_sdk_iam::Client;
use chrono::{DateTime, Utc};
use pushkey_core::types::ServiceIdentity;
use pushkey_core::{Error, Result};
use pushkey_secrets::{OneShotSecret, SecureString};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// IAM keeps at most five versions of a managed policy
const MAX_POLICY_VERSIONS: usize = 5;

/// IAM backend over the AWS SDK
pub struct AwsIamBackend {
    client: Client,
}

impl AwsIamBackend {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }

    /// Non-default versions of a policy, oldest first
    async fn non_default_versions(&self, policy_arn: &str) -> Result<(usize, Vec<String>)> {
        let resp = self
            .client
            .list_policy_versions()
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| cloud_error("iam:ListPolicyVersions", &e))?;

        let versions = resp.versions();
        let mut non_default: Vec<_> = versions
            .iter()
            .filter(|v| !v.is_default_version())
            .filter_map(|v| {
                let created = v.create_date().map(|d| d.secs()).unwrap_or(0);
                v.version_id().map(|id| (created, id.to_string()))
            })
            .collect();
        non_default.sort();

        Ok((
            versions.len(),
            non_default.into_iter().map(|(_, id)| id).collect(),
        ))
    }

    async fn delete_policy_version(&self, policy_arn: &str, version_id: &str) -> Result<()> {
        debug!("Deleting policy version {} of {}", version_id, policy_arn);
        self.client
            .delete_policy_version()
            .policy_arn(policy_arn)
            .version_id(version_id)
            .send()
            .await
            .map_err(|e| cloud_error("iam:DeletePolicyVersion", &e))?;
        Ok(())
    }
}

fn cloud_error<E>(operation: &str, err: &E) -> Error
where
    E: std::error::Error,
{
    Error::cloud(operation, DisplayErrorContext(err).to_string())
}

fn to_chrono(date: Option<&aws_sdk_iam::primitives::DateTime>) -> DateTime<Utc> {
    date.and_then(|d| DateTime::from_timestamp(d.secs(), d.subsec_nanos()))
        .unwrap_or_else(Utc::now)
}

fn build_tags(tags: &BTreeMap<String, String>) -> Result<Vec<Tag>> {
    tags.iter()
        .map(|(key, value)| {
            Tag::builder()
                .key(key)
                .value(value)
                .build()
                .map_err(|e| Error::invalid_config(format!("invalid tag '{}': {}", key, e)))
        })
        .collect()
}

#[async_trait]
impl IamBackend for AwsIamBackend {
    async fn create_policy(&self, spec: &PolicySpec) -> Result<ManagedPolicy> {
        info!("Creating managed policy {}{}", spec.path, spec.name);

        let resp = match self
            .client
            .create_policy()
            .policy_name(&spec.name)
            .path(&spec.path)
            .description(&spec.description)
            .policy_document(&spec.document)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                return Err(if service_error.is_entity_already_exists_exception() {
                    Error::conflict(format!("IAM policy {}", spec.name), message)
                } else if service_error.is_limit_exceeded_exception() {
                    Error::quota_exceeded(message)
                } else {
                    Error::cloud("iam:CreatePolicy", message)
                });
            }
        };

        let policy = resp
            .policy()
            .ok_or_else(|| Error::cloud("iam:CreatePolicy", "response contained no policy"))?;
        let arn = policy
            .arn()
            .ok_or_else(|| Error::cloud("iam:CreatePolicy", "response contained no policy ARN"))?;

        Ok(ManagedPolicy {
            arn: arn.to_string(),
            name: spec.name.clone(),
            path: spec.path.clone(),
            default_version_id: policy.default_version_id().unwrap_or("v1").to_string(),
        })
    }

    async fn update_policy_document(&self, policy_arn: &str, document: &str) -> Result<String> {
        let (count, non_default) = self.non_default_versions(policy_arn).await?;
        if count >= MAX_POLICY_VERSIONS {
            if let Some(oldest) = non_default.first() {
                self.delete_policy_version(policy_arn, oldest).await?;
            }
        }

        let resp = self
            .client
            .create_policy_version()
            .policy_arn(policy_arn)
            .policy_document(document)
            .set_as_default(true)
            .send()
            .await
            .map_err(|e| cloud_error("iam:CreatePolicyVersion", &e))?;

        let version_id = resp
            .policy_version()
            .and_then(|v| v.version_id())
            .unwrap_or_default()
            .to_string();
        info!("Published policy version {} for {}", version_id, policy_arn);
        Ok(version_id)
    }

    async fn delete_policy(&self, policy_arn: &str) -> Result<()> {
        info!("Deleting managed policy {}", policy_arn);

        if !self.policy_exists(policy_arn).await? {
            debug!("Policy {} already absent", policy_arn);
            return Ok(());
        }

        let (_, non_default) = self.non_default_versions(policy_arn).await?;
        for version_id in &non_default {
            self.delete_policy_version(policy_arn, version_id).await?;
        }

        match self.client.delete_policy().policy_arn(policy_arn).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(Error::cloud("iam:DeletePolicy", message))
                }
            }
        }
    }

    async fn create_user(&self, spec: &UserSpec) -> Result<ServiceIdentity> {
        info!("Creating IAM user {}{}", spec.path, spec.name);

        let resp = match self
            .client
            .create_user()
            .user_name(&spec.name)
            .path(&spec.path)
            .set_tags(Some(build_tags(&spec.tags)?))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                return Err(if service_error.is_entity_already_exists_exception() {
                    Error::conflict(format!("IAM user {}", spec.name), message)
                } else if service_error.is_limit_exceeded_exception() {
                    Error::quota_exceeded(message)
                } else {
                    Error::cloud("iam:CreateUser", message)
                });
            }
        };

        let user = resp
            .user()
            .ok_or_else(|| Error::cloud("iam:CreateUser", "response contained no user"))?;

        Ok(ServiceIdentity {
            name: user.user_name().to_string(),
            path: user.path().to_string(),
            arn: user.arn().to_string(),
            unique_id: user.user_id().to_string(),
            tags: spec.tags.clone(),
        })
    }

    async fn update_user_tags(
        &self,
        user_name: &str,
        current: &BTreeMap<String, String>,
        desired: &BTreeMap<String, String>,
    ) -> Result<()> {
        let (removed, upserted) = tag_changes(current, desired);

        if !removed.is_empty() {
            debug!("Removing tags {:?} from {}", removed, user_name);
            self.client
                .untag_user()
                .user_name(user_name)
                .set_tag_keys(Some(removed))
                .send()
                .await
                .map_err(|e| cloud_error("iam:UntagUser", &e))?;
        }

        if !upserted.is_empty() {
            debug!("Setting {} tags on {}", upserted.len(), user_name);
            self.client
                .tag_user()
                .user_name(user_name)
                .set_tags(Some(build_tags(&upserted)?))
                .send()
                .await
                .map_err(|e| cloud_error("iam:TagUser", &e))?;
        }

        Ok(())
    }

    async fn delete_user(&self, user_name: &str) -> Result<()> {
        info!("Deleting IAM user {}", user_name);
        match self.client.delete_user().user_name(user_name).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(Error::cloud("iam:DeleteUser", message))
                }
            }
        }
    }

    async fn attach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        info!("Attaching {} to {}", policy_arn, user_name);
        self.client
            .attach_user_policy()
            .user_name(user_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| cloud_error("iam:AttachUserPolicy", &e))?;
        Ok(())
    }

    async fn detach_user_policy(&self, user_name: &str, policy_arn: &str) -> Result<()> {
        info!("Detaching {} from {}", policy_arn, user_name);
        match self
            .client
            .detach_user_policy()
            .user_name(user_name)
            .policy_arn(policy_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(Error::cloud("iam:DetachUserPolicy", message))
                }
            }
        }
    }

    async fn create_access_key(&self, user_name: &str) -> Result<IssuedKey> {
        info!("Issuing access key for {}", user_name);

        let resp = match self.client.create_access_key().user_name(user_name).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                return Err(if e.into_service_error().is_limit_exceeded_exception() {
                    Error::quota_exceeded(message)
                } else {
                    Error::cloud("iam:CreateAccessKey", message)
                });
            }
        };

        let key = resp
            .access_key
            .ok_or_else(|| Error::cloud("iam:CreateAccessKey", "response contained no key"))?;
        let created_at = to_chrono(key.create_date.as_ref());
        let secret = OneShotSecret::new(
            key.access_key_id.clone(),
            SecureString::new(key.secret_access_key),
        );

        Ok(IssuedKey {
            access_key_id: key.access_key_id,
            user_name: key.user_name,
            created_at,
            secret,
        })
    }

    async fn delete_access_key(&self, user_name: &str, access_key_id: &str) -> Result<()> {
        info!("Revoking access key {} of {}", access_key_id, user_name);
        match self
            .client
            .delete_access_key()
            .user_name(user_name)
            .access_key_id(access_key_id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_no_such_entity_exception() {
                    Ok(())
                } else {
                    Err(Error::cloud("iam:DeleteAccessKey", message))
                }
            }
        }
    }

    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_access_keys()
            .user_name(user_name)
            .send()
            .await
            .map_err(|e| cloud_error("iam:ListAccessKeys", &e))?;

        Ok(resp
            .access_key_metadata()
            .iter()
            .filter_map(|m| m.access_key_id().map(str::to_string))
            .collect())
    }
}

impl AwsIamBackend {
    async fn policy_exists(&self, policy_arn: &str) -> Result<bool> {
        match self.client.get_policy().policy_arn(policy_arn).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_no_such_entity_exception() {
                    Ok(false)
                } else {
                    Err(Error::cloud("iam:GetPolicy", message))
                }
            }
        }
    }
}

impl std::fmt::Debug for AwsIamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsIamBackend").finish_non_exhaustive()
    }
}
