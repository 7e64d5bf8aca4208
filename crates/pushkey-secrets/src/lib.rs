//! Key material handling for pushkey
//!
//! This crate owns everything that touches the secret half of the CI key pair:
//! - **Hygiene**: `SecureString` zeroed on drop and redacted in `Debug`/`Display`
//! - **One-shot reveal**: `OneShotSecret` hands issued material out exactly once
//! - **Publishing**: `SecretPublisher` writes both halves to fixed, encrypted
//!   parameter-store paths (SSM `SecureString`)
//! - **Audit**: every write/delete is logged without its value

pub mod publisher;
pub mod reveal;
pub mod security;
pub mod ssm;
pub mod store;
pub mod types;

pub use publisher::SecretPublisher;
pub use reveal::OneShotSecret;
pub use security::{sanitize_error, AuditLog, SecureString};
pub use ssm::SsmParameterStore;
pub use store::{ParameterStore, PutParameter};
pub use types::{KeyPair, SecretField, SecretRecord};
