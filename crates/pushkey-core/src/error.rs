//! Error types for pushkey

use thiserror::Error;

/// Result type alias using pushkey-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every pushkey library crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The ambient AWS session could not be resolved to a caller identity
    #[error("Not authenticated: {message}")]
    NotAuthenticated { message: String },

    /// No region was configured and none could be resolved from the environment
    #[error("No AWS region configured: set `region` in pushkey.yaml or AWS_REGION")]
    MissingRegion,

    /// A resource with the same name already exists outside the pushkey state
    #[error("{resource} already exists and is not managed by this state: {message}")]
    Conflict { resource: String, message: String },

    /// A service limit was hit (e.g. the per-user access key limit)
    #[error("Service limit exceeded: {message}")]
    QuotaExceeded { message: String },

    /// Any other control plane failure, reported verbatim
    #[error("{operation} failed: {message}")]
    Cloud { operation: String, message: String },

    /// One-shot secret material was requested a second time
    #[error("Secret material for access key {key_id} was already revealed")]
    SecretAlreadyRevealed { key_id: String },

    /// A cached plan no longer matches the state it was computed against
    #[error("Saved plan is stale: {message}")]
    StalePlan { message: String },

    /// Orchestrator was asked to move between phases out of order
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Circular dependency in the resource graph
    #[error("Circular dependency detected at: {node}")]
    CircularDependency { node: String },

    /// A resource in state is missing an attribute a dependent needs
    #[error("Resource {address} is missing attribute {attribute}")]
    MissingAttribute { address: String, attribute: String },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a not authenticated error
    pub fn not_authenticated(message: impl Into<String>) -> Self {
        Self::NotAuthenticated {
            message: message.into(),
        }
    }

    /// Create a naming conflict error
    pub fn conflict(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a quota exceeded error
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded {
            message: message.into(),
        }
    }

    /// Create a generic control plane error
    pub fn cloud(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cloud {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a stale plan error
    pub fn stale_plan(message: impl Into<String>) -> Self {
        Self::StalePlan {
            message: message.into(),
        }
    }

    /// Create an invalid transition error
    pub fn invalid_transition(from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Create a missing attribute error
    pub fn missing_attribute(address: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            address: address.into(),
            attribute: attribute.into(),
        }
    }

    /// Whether this error was raised before any resource could have been touched
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NotAuthenticated { .. } | Self::MissingRegion)
    }
}
