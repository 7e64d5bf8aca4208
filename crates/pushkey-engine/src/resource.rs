//! Resource nodes and their persisted state

use chrono::{DateTime, Utc};
use pushkey_secrets::{SecretField, SecureString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Non-sensitive attributes of a resource
pub type Attributes = BTreeMap<String, Value>;

/// The six resources pushkey manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Node {
    #[serde(rename = "policy")]
    Policy,
    #[serde(rename = "identity")]
    Identity,
    #[serde(rename = "attachment")]
    Attachment,
    #[serde(rename = "access_key")]
    AccessKey,
    #[serde(rename = "parameter.access_key_id")]
    AccessKeyIdParameter,
    #[serde(rename = "parameter.secret_access_key")]
    SecretAccessKeyParameter,
}

impl Node {
    pub const ALL: [Node; 6] = [
        Node::Policy,
        Node::Identity,
        Node::Attachment,
        Node::AccessKey,
        Node::AccessKeyIdParameter,
        Node::SecretAccessKeyParameter,
    ];

    /// State address
    pub fn address(&self) -> &'static str {
        match self {
            Node::Policy => "policy",
            Node::Identity => "identity",
            Node::Attachment => "attachment",
            Node::AccessKey => "access_key",
            Node::AccessKeyIdParameter => "parameter.access_key_id",
            Node::SecretAccessKeyParameter => "parameter.secret_access_key",
        }
    }

    pub fn from_address(address: &str) -> Option<Node> {
        Node::ALL.into_iter().find(|n| n.address() == address)
    }

    /// Human readable resource kind
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Policy => "iam_policy",
            Node::Identity => "iam_user",
            Node::Attachment => "iam_user_policy_attachment",
            Node::AccessKey => "iam_access_key",
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => "ssm_parameter",
        }
    }

    /// Nodes that must exist before this one
    pub fn dependencies(&self) -> &'static [Node] {
        match self {
            Node::Policy | Node::Identity => &[],
            Node::Attachment => &[Node::Policy, Node::Identity],
            Node::AccessKey => &[Node::Identity],
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => &[Node::AccessKey],
        }
    }

    /// Attributes whose change forces a replacement
    pub fn immutable_attributes(&self) -> &'static [&'static str] {
        match self {
            Node::Policy => &["name", "path", "description"],
            Node::Identity => &["name", "path"],
            Node::Attachment => &["user_name", "policy_name"],
            Node::AccessKey => &["user_name"],
            Node::AccessKeyIdParameter | Node::SecretAccessKeyParameter => &["path"],
        }
    }

    /// Whether a new parent instance forces this node to be replaced.
    ///
    /// Parameters are overwritten in place instead.
    pub fn replaced_with_parent(&self) -> bool {
        matches!(self, Node::Attachment | Node::AccessKey)
    }

    /// Parameter field stored by this node, if it is a parameter
    pub fn secret_field(&self) -> Option<SecretField> {
        match self {
            Node::AccessKeyIdParameter => Some(SecretField::AccessKeyId),
            Node::SecretAccessKeyParameter => Some(SecretField::SecretAccessKey),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

/// A resource as recorded in the state file
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    pub kind: String,

    /// Cloud identifier (ARN, user name, key id or parameter path)
    pub id: String,

    #[serde(default)]
    pub attributes: Attributes,

    /// Key material; written to the state file only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sensitive_attributes: BTreeMap<String, SecureString>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(node: Node, id: impl Into<String>, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            kind: node.kind().to_string(),
            id: id.into(),
            attributes,
            sensitive_attributes: BTreeMap::new(),
            dependencies: node
                .dependencies()
                .iter()
                .map(|d| d.address().to_string())
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_sensitive(mut self, name: &str, value: SecureString) -> Self {
        self.sensitive_attributes.insert(name.to_string(), value);
        self
    }

    /// String attribute by name
    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    /// Mark the resource as modified now
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl fmt::Debug for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceState")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("attributes", &self.attributes)
            .field(
                "sensitive_attributes",
                &self.sensitive_attributes.keys().collect::<Vec<_>>(),
            )
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_roundtrip() {
        for node in Node::ALL {
            assert_eq!(Node::from_address(node.address()), Some(node));
        }
        assert_eq!(Node::from_address("bucket"), None);
    }

    #[test]
    fn test_serde_uses_address() {
        let json = serde_json::to_string(&Node::SecretAccessKeyParameter).unwrap();
        assert_eq!(json, "\"parameter.secret_access_key\"");
    }

    #[test]
    fn test_resource_debug_hides_secrets() {
        let state = ResourceState::new(Node::AccessKey, "AKIAEXAMPLE", Attributes::new())
            .with_sensitive("secret_access_key", SecureString::from("wJalrXUtnFEMI"));

        let debug = format!("{:?}", state);
        assert!(debug.contains("secret_access_key"));
        assert!(!debug.contains("wJalrXUtnFEMI"));
    }

    #[test]
    fn test_dependencies_recorded() {
        let state = ResourceState::new(
            Node::Attachment,
            "github-actions-ecr",
            Attributes::from([("user_name".to_string(), json!("github-actions-ecr"))]),
        );
        assert_eq!(state.dependencies, vec!["policy", "identity"]);
        assert_eq!(state.attr_str("user_name"), Some("github-actions-ecr"));
    }
}
