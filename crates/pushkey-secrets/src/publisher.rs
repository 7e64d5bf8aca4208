//! Publishes key pairs into the parameter store

use crate::security::AuditLog;
use crate::store::{ParameterStore, PutParameter};
use crate::types::{KeyPair, SecretField, SecretRecord};
use pushkey_core::Result;
use std::sync::Arc;
use tracing::info;

/// Writes both halves of a key pair to their fixed parameter paths
#[derive(Clone)]
pub struct SecretPublisher {
    store: Arc<dyn ParameterStore>,
    kms_key_id: Option<String>,
}

impl SecretPublisher {
    pub fn new(store: Arc<dyn ParameterStore>, kms_key_id: Option<String>) -> Self {
        Self { store, kms_key_id }
    }

    /// Write one field of the key pair (last write wins)
    pub async fn publish_field(&self, field: SecretField, key: &KeyPair) -> Result<SecretRecord> {
        let path = field.parameter_path();
        let value = field.value_of(key);
        let request = PutParameter {
            path,
            value: &value,
            description: field.description(),
            kms_key_id: self.kms_key_id.as_deref(),
        };

        let audit = AuditLog::new("put", path, self.store.name());
        match self.store.put_secure(&request).await {
            Ok(version) => {
                audit.log();
                info!("Published {} to {} (version {})", field, path, version);
                Ok(SecretRecord {
                    field,
                    path: path.to_string(),
                    version,
                    written_at: chrono::Utc::now(),
                })
            }
            Err(e) => {
                audit.with_error(&e.to_string()).log();
                Err(e)
            }
        }
    }

    /// Write both fields of the key pair
    pub async fn publish(&self, key: &KeyPair) -> Result<Vec<SecretRecord>> {
        let mut records = Vec::with_capacity(SecretField::ALL.len());
        for field in SecretField::ALL {
            records.push(self.publish_field(field, key).await?);
        }
        Ok(records)
    }

    /// Remove the parameter for one field
    pub async fn unpublish(&self, field: SecretField) -> Result<()> {
        let path = field.parameter_path();
        let audit = AuditLog::new("delete", path, self.store.name());
        match self.store.delete(path).await {
            Ok(()) => {
                audit.log();
                Ok(())
            }
            Err(e) => {
                audit.with_error(&e.to_string()).log();
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for SecretPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPublisher")
            .field("store", &self.store.name())
            .field("kms_key_id", &self.kms_key_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecureString;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        values: Mutex<HashMap<String, (String, Option<String>, i64)>>,
    }

    #[async_trait]
    impl ParameterStore for RecordingStore {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn put_secure(&self, request: &PutParameter<'_>) -> Result<i64> {
            let mut values = self.values.lock().unwrap();
            let version = values.get(request.path).map(|v| v.2 + 1).unwrap_or(1);
            values.insert(
                request.path.to_string(),
                (
                    request.value.as_str().to_string(),
                    request.kms_key_id.map(str::to_string),
                    version,
                ),
            );
            Ok(version)
        }

        async fn delete(&self, path: &str) -> Result<()> {
            self.values.lock().unwrap().remove(path);
            Ok(())
        }
    }

    fn key(id: &str, secret: &str) -> KeyPair {
        KeyPair {
            access_key_id: id.to_string(),
            secret_access_key: SecureString::from(secret),
            user_name: "github-actions-ecr".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_writes_both_paths() {
        let store = Arc::new(RecordingStore::default());
        let publisher = SecretPublisher::new(store.clone(), None);

        let records = publisher.publish(&key("AKIA1", "secret-1")).await.unwrap();
        assert_eq!(records.len(), 2);

        let values = store.values.lock().unwrap();
        assert_eq!(values["/ci-cd/github-actions/access-key-id"].0, "AKIA1");
        assert_eq!(values["/ci-cd/github-actions/secret-access-key"].0, "secret-1");
        assert!(values["/ci-cd/github-actions/secret-access-key"].1.is_none());
    }

    #[tokio::test]
    async fn test_publish_overwrites_in_place() {
        let store = Arc::new(RecordingStore::default());
        let publisher = SecretPublisher::new(store.clone(), Some("alias/ci".to_string()));

        publisher.publish(&key("AKIA1", "secret-1")).await.unwrap();
        let records = publisher.publish(&key("AKIA2", "secret-2")).await.unwrap();
        assert!(records.iter().all(|r| r.version == 2));

        let values = store.values.lock().unwrap();
        assert_eq!(values["/ci-cd/github-actions/access-key-id"].0, "AKIA2");
        assert_eq!(
            values["/ci-cd/github-actions/secret-access-key"].1.as_deref(),
            Some("alias/ci")
        );
    }

    #[tokio::test]
    async fn test_unpublish() {
        let store = Arc::new(RecordingStore::default());
        let publisher = SecretPublisher::new(store.clone(), None);
        publisher.publish(&key("AKIA1", "secret-1")).await.unwrap();

        publisher.unpublish(SecretField::SecretAccessKey).await.unwrap();
        let values = store.values.lock().unwrap();
        assert!(!values.contains_key("/ci-cd/github-actions/secret-access-key"));
        assert!(values.contains_key("/ci-cd/github-actions/access-key-id"));
    }
}
