//! Desired configuration of every managed resource

use crate::resource::{Attributes, Node};
use pushkey_cloud::{PolicySpec, UserSpec};
use pushkey_core::types::CallerIdentity;
use pushkey_core::{PolicyBuilder, PushkeyConfig, Result};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Everything the planner needs to know about the desired world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blueprint {
    pub caller: CallerIdentity,
    pub user: UserSpec,
    pub policy: PolicySpec,
    pub kms_key_id: Option<String>,
}

impl Blueprint {
    /// Build the blueprint for `config` as seen by `caller`
    pub fn new(config: &PushkeyConfig, caller: &CallerIdentity) -> Result<Self> {
        let document = PolicyBuilder::for_caller(caller).build()?;
        let identity = config.identity();
        let policy = config.policy();

        Ok(Self {
            caller: caller.clone(),
            user: UserSpec {
                name: identity.name.clone(),
                path: identity.path.clone(),
                tags: identity.tags.clone(),
            },
            policy: PolicySpec {
                name: policy.name.clone(),
                path: policy.path.clone(),
                description: policy.description.clone(),
                document: document.to_json()?,
            },
            kms_key_id: config.secrets().kms_key_id.clone(),
        })
    }

    /// Desired attributes of `node`
    ///
    /// Only these keys take part in diffing; computed attributes such as ARNs
    /// are recorded in state but never compared.
    pub fn desired(&self, node: Node) -> Attributes {
        let pairs: Vec<(&str, Value)> = match node {
            Node::Policy => vec![
                ("name", json!(self.policy.name)),
                ("path", json!(self.policy.path)),
                ("description", json!(self.policy.description)),
                ("document", json!(self.policy.document)),
            ],
            Node::Identity => vec![
                ("name", json!(self.user.name)),
                ("path", json!(self.user.path)),
                ("tags", json!(self.user.tags)),
            ],
            Node::Attachment => vec![
                ("user_name", json!(self.user.name)),
                ("policy_name", json!(self.policy.name)),
            ],
            Node::AccessKey => vec![("user_name", json!(self.user.name))],
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => {
                let path = node
                    .secret_field()
                    .map(|f| f.parameter_path())
                    .unwrap_or_default();
                vec![("path", json!(path)), ("kms_key_id", json!(self.kms_key_id))]
            }
        };

        pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>()
    }

    /// SHA-256 over the desired attributes of every node
    ///
    /// Cached plans carry this so they can be rejected once the
    /// configuration they were computed from has changed.
    pub fn fingerprint(&self) -> Result<String> {
        let desired: BTreeMap<&str, Attributes> = Node::ALL
            .iter()
            .map(|node| (node.address(), self.desired(*node)))
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&desired)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pushkey_core::types::AuthorizationDocument;

    fn caller() -> CallerIdentity {
        CallerIdentity {
            account: "123456789012".to_string(),
            arn: "arn:aws:iam::123456789012:user/operator".to_string(),
            user_id: "AIDAEXAMPLE".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    fn config(yaml: &str) -> PushkeyConfig {
        PushkeyConfig::parse(yaml, Utf8PathBuf::from("/tmp/pushkey.yaml")).unwrap()
    }

    #[test]
    fn test_blueprint_from_defaults() {
        let blueprint = Blueprint::new(&config(""), &caller()).unwrap();
        assert_eq!(blueprint.user.name, "github-actions-ecr");
        assert_eq!(blueprint.policy.path, "/ci-cd/");
        assert!(blueprint.kms_key_id.is_none());

        let doc = AuthorizationDocument::from_json(&blueprint.policy.document).unwrap();
        assert_eq!(doc.statements.len(), 3);
    }

    #[test]
    fn test_desired_parameter_attributes() {
        let blueprint = Blueprint::new(
            &config("secrets:\n  kms_key_id: alias/ci\n"),
            &caller(),
        )
        .unwrap();

        let desired = blueprint.desired(Node::SecretAccessKeyParameter);
        assert_eq!(
            desired["path"],
            json!("/ci-cd/github-actions/secret-access-key")
        );
        assert_eq!(desired["kms_key_id"], json!("alias/ci"));
    }

    #[test]
    fn test_desired_is_deterministic() {
        let a = Blueprint::new(&config(""), &caller()).unwrap();
        let b = Blueprint::new(&config(""), &caller()).unwrap();
        for node in Node::ALL {
            assert_eq!(a.desired(node), b.desired(node));
        }
    }

    #[test]
    fn test_fingerprint_tracks_config() {
        let base = Blueprint::new(&config(""), &caller()).unwrap();
        let same = Blueprint::new(&config(""), &caller()).unwrap();
        let renamed = Blueprint::new(&config("identity:\n  name: ci-pusher\n"), &caller()).unwrap();

        let digest = base.fingerprint().unwrap();
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, same.fingerprint().unwrap());
        assert_ne!(digest, renamed.fingerprint().unwrap());
    }
}
