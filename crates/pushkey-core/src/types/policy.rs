//! Authorization document types in the IAM JSON policy grammar

use serde::{Deserialize, Serialize};

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single permission statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(rename = "Effect")]
    pub effect: Effect,

    #[serde(rename = "Action", with = "one_or_many")]
    pub actions: Vec<String>,

    #[serde(rename = "Resource", with = "one_or_many")]
    pub resources: Vec<String>,
}

impl Statement {
    /// Whether this statement grants on the account-wide wildcard resource
    pub fn is_wildcard(&self) -> bool {
        self.resources.iter().any(|r| r == "*")
    }
}

/// An ordered list of statements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationDocument {
    #[serde(rename = "Version")]
    pub version: String,

    #[serde(rename = "Statement")]
    pub statements: Vec<Statement>,
}

impl AuthorizationDocument {
    /// Compact JSON rendering, used as the policy document and its state fingerprint
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable JSON rendering
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document from its JSON form
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Find a statement by its Sid
    pub fn statement(&self, sid: &str) -> Option<&Statement> {
        self.statements
            .iter()
            .find(|s| s.sid.as_deref() == Some(sid))
    }
}

/// IAM accepts either a single string or a list for `Action` and `Resource`
mod one_or_many {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    pub fn serialize<S>(values: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match values {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_resource_serializes_as_string() {
        let stmt = Statement {
            sid: None,
            effect: Effect::Allow,
            actions: vec!["ecr:GetAuthorizationToken".to_string()],
            resources: vec!["*".to_string()],
        };
        let json = serde_json::to_value(&stmt).unwrap();
        assert_eq!(json["Resource"], "*");
        assert_eq!(json["Action"], "ecr:GetAuthorizationToken");
        assert!(json.get("Sid").is_none());
    }

    #[test]
    fn test_parses_both_resource_forms() {
        let json = r#"{
            "Version": "2012-10-17",
            "Statement": [
                {"Effect": "Allow", "Action": "ecr:GetAuthorizationToken", "Resource": "*"},
                {"Sid": "Push", "Effect": "Deny", "Action": ["ecr:PutImage"], "Resource": ["a", "b"]}
            ]
        }"#;
        let doc = AuthorizationDocument::from_json(json).unwrap();
        assert_eq!(doc.statements[0].resources, vec!["*"]);
        assert!(doc.statements[0].is_wildcard());
        let push = doc.statement("Push").unwrap();
        assert_eq!(push.effect, Effect::Deny);
        assert_eq!(push.resources.len(), 2);
    }
}
