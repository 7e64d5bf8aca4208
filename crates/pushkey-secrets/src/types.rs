//! Key pair and secret record types

use crate::security::SecureString;
use chrono::{DateTime, Utc};
use pushkey_core::config::{ACCESS_KEY_ID_PARAMETER, SECRET_ACCESS_KEY_PARAMETER};
use serde::{Deserialize, Serialize};

/// A long-lived access key bound to the CI identity
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Public half, e.g. `AKIA...`
    pub access_key_id: String,

    /// Secret half, only ever available from the create response
    pub secret_access_key: SecureString,

    /// IAM user that owns the key
    pub user_name: String,

    pub created_at: DateTime<Utc>,
}

/// Which half of a key pair a parameter stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretField {
    AccessKeyId,
    SecretAccessKey,
}

impl SecretField {
    /// Both fields, in publish order
    pub const ALL: [SecretField; 2] = [SecretField::AccessKeyId, SecretField::SecretAccessKey];

    /// Fixed parameter-store path for this field
    pub fn parameter_path(&self) -> &'static str {
        match self {
            SecretField::AccessKeyId => ACCESS_KEY_ID_PARAMETER,
            SecretField::SecretAccessKey => SECRET_ACCESS_KEY_PARAMETER,
        }
    }

    /// Parameter description shown in the parameter store console
    pub fn description(&self) -> &'static str {
        match self {
            SecretField::AccessKeyId => "Access key id for the GitHub Actions ECR push identity",
            SecretField::SecretAccessKey => {
                "Secret access key for the GitHub Actions ECR push identity"
            }
        }
    }

    /// Value of this field taken from a key pair
    pub fn value_of(&self, key: &KeyPair) -> SecureString {
        match self {
            SecretField::AccessKeyId => SecureString::from(key.access_key_id.as_str()),
            SecretField::SecretAccessKey => key.secret_access_key.clone(),
        }
    }
}

impl std::fmt::Display for SecretField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretField::AccessKeyId => write!(f, "access_key_id"),
            SecretField::SecretAccessKey => write!(f, "secret_access_key"),
        }
    }
}

/// A parameter written for one field of a key pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub field: SecretField,

    /// Parameter path
    pub path: String,

    /// Version assigned by the store
    pub version: i64,

    pub written_at: DateTime<Utc>,
}
