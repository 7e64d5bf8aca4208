//! Parameter store abstraction

use crate::security::SecureString;
use async_trait::async_trait;
use pushkey_core::Result;

/// A request to write one encrypted parameter
#[derive(Debug)]
pub struct PutParameter<'a> {
    pub path: &'a str,
    pub value: &'a SecureString,
    pub description: &'a str,
    /// Customer managed key; `None` uses the store's managed key
    pub kms_key_id: Option<&'a str>,
}

/// Encrypted key-value storage for sensitive configuration
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Backend name used in audit entries
    fn name(&self) -> &'static str;

    /// Write an encrypted parameter, overwriting any existing value
    ///
    /// Returns the version assigned by the store.
    async fn put_secure(&self, request: &PutParameter<'_>) -> Result<i64>;

    /// Delete a parameter; deleting a missing parameter succeeds
    async fn delete(&self, path: &str) -> Result<()>;
}
