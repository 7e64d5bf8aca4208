//! AWS Systems Manager Parameter Store backend
//!
//! Parameters are written as `SecureString`, encrypted at rest with the
//! account's managed `alias/aws/ssm` key unless a KMS key id is supplied.

use crate::security::sanitize_error;
use crate::store::{ParameterStore, PutParameter};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;
use pushkey_core::{Error, Result};
use tracing::debug;

/// Parameter store backed by SSM
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    /// Create a store from a loaded SDK configuration
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    fn name(&self) -> &'static str {
        "ssm"
    }

    async fn put_secure(&self, request: &PutParameter<'_>) -> Result<i64> {
        debug!(
            "Writing SecureString parameter {} ({} bytes)",
            request.path,
            request.value.len()
        );

        let mut call = self
            .client
            .put_parameter()
            .name(request.path)
            .value(request.value.as_str())
            .description(request.description)
            .r#type(ParameterType::SecureString)
            .overwrite(true);

        if let Some(key_id) = request.kms_key_id {
            call = call.key_id(key_id);
        }

        let resp = call.send().await.map_err(|e| {
            Error::cloud(
                format!("ssm:PutParameter {}", request.path),
                sanitize_error(&DisplayErrorContext(&e).to_string()),
            )
        })?;

        Ok(resp.version())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        debug!("Deleting parameter {}", path);

        match self.client.delete_parameter().name(path).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                let service_error = e.into_service_error();
                if service_error.is_parameter_not_found() {
                    debug!("Parameter {} already absent", path);
                    Ok(())
                } else {
                    Err(Error::cloud(format!("ssm:DeleteParameter {}", path), message))
                }
            }
        }
    }
}

impl std::fmt::Debug for SsmParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsmParameterStore").finish_non_exhaustive()
    }
}
