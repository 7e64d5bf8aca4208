//! Executes plans against the control plane
//!
//! Deletions (including the delete half of a replacement) run first in reverse
//! dependency order, then creates and updates run in dependency order. State is
//! saved after every node so a failure leaves it exactly as far as execution
//! got. Nothing is rolled back.

use crate::blueprint::Blueprint;
use crate::graph::ResourceGraph;
use crate::plan::{Action, Plan};
use crate::resource::{Attributes, Node, ResourceState};
use crate::state::{StateFile, StateStore};
use pushkey_cloud::IamBackend;
use pushkey_core::{Error, Result};
use pushkey_secrets::{KeyPair, SecretPublisher};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Sensitive attribute holding the secret half of the access key
pub const SECRET_ACCESS_KEY_ATTRIBUTE: &str = "secret_access_key";

/// What an apply or destroy actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Executed steps in order, no-ops excluded
    pub steps: Vec<(Node, Action)>,
}

impl ApplyReport {
    fn record(&mut self, node: Node, action: Action) {
        self.steps.push((node, action));
    }

    pub fn count(&self, action: Action) -> usize {
        self.steps.iter().filter(|(_, a)| *a == action).count()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Walks the resource graph for a plan
pub struct Applier {
    iam: Arc<dyn IamBackend>,
    publisher: SecretPublisher,
    store: StateStore,
}

impl Applier {
    pub fn new(iam: Arc<dyn IamBackend>, publisher: SecretPublisher, store: StateStore) -> Self {
        Self {
            iam,
            publisher,
            store,
        }
    }

    /// Converge the cloud onto `blueprint` following `plan`
    pub async fn apply(
        &self,
        plan: &Plan,
        blueprint: &Blueprint,
        state: &mut StateFile,
    ) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        self.delete_phase(plan, state, &mut report).await?;

        for node in ResourceGraph::new().topological_order()? {
            let Some(change) = plan.change_for(node) else {
                continue;
            };
            let action = change.action;
            match action {
                Action::NoOp | Action::Delete => continue,
                Action::Create | Action::Replace => self.create(node, blueprint, state).await?,
                Action::Update => {
                    self.update(node, &change.changed_attributes, blueprint, state)
                        .await?
                }
            }
            self.store.save(state)?;
            report.record(node, action);
        }

        Ok(report)
    }

    /// Delete every resource a destroy plan names
    pub async fn destroy(&self, plan: &Plan, state: &mut StateFile) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        self.delete_phase(plan, state, &mut report).await?;
        Ok(report)
    }

    async fn delete_phase(
        &self,
        plan: &Plan,
        state: &mut StateFile,
        report: &mut ApplyReport,
    ) -> Result<()> {
        for node in ResourceGraph::new().reverse_order()? {
            let Some(action) = plan.action_for(node).filter(Action::deletes) else {
                continue;
            };
            let Some(resource) = state.get(node).cloned() else {
                continue;
            };

            self.delete(node, &resource).await?;
            state.remove(node);
            self.store.save(state)?;
            info!("Deleted {} {}", node, resource.id);

            // The create half of a replacement is recorded by the create phase
            if action == Action::Delete {
                report.record(node, action);
            }
        }

        for address in state.unknown_addresses() {
            warn!("Ignoring unrecognised resource '{}' in state", address);
        }
        Ok(())
    }

    async fn delete(&self, node: Node, resource: &ResourceState) -> Result<()> {
        match node {
            Node::Policy => self.iam.delete_policy(&resource.id).await,
            Node::Identity => self.iam.delete_user(&resource.id).await,
            Node::Attachment => {
                self.iam
                    .detach_user_policy(
                        required(node, resource, "user_name")?,
                        required(node, resource, "policy_arn")?,
                    )
                    .await
            }
            Node::AccessKey => {
                self.iam
                    .delete_access_key(required(node, resource, "user_name")?, &resource.id)
                    .await
            }
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => {
                let field = node
                    .secret_field()
                    .ok_or_else(|| Error::missing_attribute(node.address(), "field"))?;
                self.publisher.unpublish(field).await
            }
        }
    }

    async fn create(&self, node: Node, blueprint: &Blueprint, state: &mut StateFile) -> Result<()> {
        let mut attributes = blueprint.desired(node);

        let resource = match node {
            Node::Policy => {
                let policy = self.iam.create_policy(&blueprint.policy).await?;
                attributes.insert("arn".to_string(), json!(policy.arn));
                attributes.insert(
                    "default_version_id".to_string(),
                    json!(policy.default_version_id),
                );
                info!("Created policy {}", policy.arn);
                ResourceState::new(node, policy.arn, attributes)
            }
            Node::Identity => {
                let user = self.iam.create_user(&blueprint.user).await?;
                attributes.insert("arn".to_string(), json!(user.arn));
                attributes.insert("unique_id".to_string(), json!(user.unique_id));
                info!("Created identity {}", user.arn);
                ResourceState::new(node, user.name, attributes)
            }
            Node::Attachment => {
                let user_name = state.require(Node::Identity)?.id.clone();
                let policy_arn = state.require(Node::Policy)?.id.clone();
                self.iam.attach_user_policy(&user_name, &policy_arn).await?;
                attributes.insert("policy_arn".to_string(), json!(policy_arn));
                info!("Attached {} to {}", policy_arn, user_name);
                ResourceState::new(node, format!("{}/{}", user_name, policy_arn), attributes)
            }
            Node::AccessKey => self.issue_key(state, attributes).await?,
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => {
                self.publish(node, state, attributes).await?
            }
        };

        state.insert(node, resource);
        Ok(())
    }

    async fn issue_key(
        &self,
        state: &StateFile,
        mut attributes: Attributes,
    ) -> Result<ResourceState> {
        let user_name = state.require(Node::Identity)?.id.clone();

        let mut issued = match self.iam.create_access_key(&user_name).await {
            Ok(issued) => issued,
            Err(err @ Error::QuotaExceeded { .. }) => {
                // Existing keys are left alone; list them for the operator
                if let Ok(existing) = self.iam.list_access_keys(&user_name).await {
                    warn!(
                        "{} already holds access keys: {}",
                        user_name,
                        existing.join(", ")
                    );
                }
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let secret = issued.secret.take()?;
        attributes.insert("status".to_string(), json!("Active"));
        attributes.insert(
            "created_at".to_string(),
            json!(issued.created_at.to_rfc3339()),
        );
        info!("Issued access key {} for {}", issued.access_key_id, user_name);

        Ok(
            ResourceState::new(Node::AccessKey, issued.access_key_id, attributes)
                .with_sensitive(SECRET_ACCESS_KEY_ATTRIBUTE, secret),
        )
    }

    async fn publish(
        &self,
        node: Node,
        state: &StateFile,
        mut attributes: Attributes,
    ) -> Result<ResourceState> {
        let field = node
            .secret_field()
            .ok_or_else(|| Error::missing_attribute(node.address(), "field"))?;
        let key = key_pair(state)?;
        let record = self.publisher.publish_field(field, &key).await?;

        attributes.insert("version".to_string(), json!(record.version));
        attributes.insert(
            "written_at".to_string(),
            json!(record.written_at.to_rfc3339()),
        );
        Ok(ResourceState::new(node, record.path, attributes))
    }

    /// Converge `node` in place, recording only the attributes the plan names
    async fn update(
        &self,
        node: Node,
        changed: &[String],
        blueprint: &Blueprint,
        state: &mut StateFile,
    ) -> Result<()> {
        let desired = blueprint.desired(node);
        let mut computed = Attributes::new();

        match node {
            Node::Policy => {
                let arn = state.require(node)?.id.clone();
                let version = self
                    .iam
                    .update_policy_document(&arn, &blueprint.policy.document)
                    .await?;
                info!("Published policy version {} for {}", version, arn);
                computed.insert("default_version_id".to_string(), json!(version));
            }
            Node::Identity => {
                let current = state.require(node)?;
                let current_tags: BTreeMap<String, String> = current
                    .attributes
                    .get("tags")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()?
                    .unwrap_or_default();
                self.iam
                    .update_user_tags(&current.id, &current_tags, &blueprint.user.tags)
                    .await?;
                info!("Updated tags on {}", current.id);
            }
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => {
                let fresh = self.publish(node, state, Attributes::new()).await?;
                computed.extend(fresh.attributes);
            }
            // Every desired attribute of these is immutable, so they only
            // ever need replacing
            Node::Attachment | Node::AccessKey => {}
        }

        if let Some(resource) = state.get_mut(node) {
            for name in changed {
                if let Some(value) = desired.get(name) {
                    resource.attributes.insert(name.clone(), value.clone());
                }
            }
            resource.attributes.extend(computed);
            resource.touch();
        }
        Ok(())
    }
}

impl std::fmt::Debug for Applier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Applier")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

fn required<'a>(node: Node, resource: &'a ResourceState, attribute: &str) -> Result<&'a str> {
    resource
        .attr_str(attribute)
        .ok_or_else(|| Error::missing_attribute(node.address(), attribute))
}

/// Rebuild the key pair from state for publishing
fn key_pair(state: &StateFile) -> Result<KeyPair> {
    let key = state.require(Node::AccessKey)?;
    let secret = key
        .sensitive_attributes
        .get(SECRET_ACCESS_KEY_ATTRIBUTE)
        .cloned()
        .ok_or_else(|| {
            Error::missing_attribute(Node::AccessKey.address(), SECRET_ACCESS_KEY_ATTRIBUTE)
        })?;

    Ok(KeyPair {
        access_key_id: key.id.clone(),
        secret_access_key: secret,
        user_name: required(Node::AccessKey, key, "user_name")?.to_string(),
        created_at: key.created_at,
    })
}

/// Attribute values that are safe to show
pub fn display_attributes(resource: &ResourceState) -> Vec<(String, String)> {
    resource
        .attributes
        .iter()
        .filter(|(name, _)| name.as_str() != "document")
        .map(|(name, value)| {
            let shown = match value {
                Value::String(s) => s.clone(),
                Value::Null => "-".to_string(),
                other => other.to_string(),
            };
            (name.clone(), shown)
        })
        .collect()
}
