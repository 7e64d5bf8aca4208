//! Security utilities for key material
//!
//! Provides:
//! - SecureString with zeroize
//! - Audit logging (never logs secret values)
//! - Error sanitization

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secure string that is automatically zeroed on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SecureString {
    inner: String,
}

impl SecureString {
    /// Create a new secure string
    pub fn new(value: String) -> Self {
        Self { inner: value }
    }

    /// Get the string value (use with caution)
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Convert to owned String (consumes self)
    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.inner)
    }

    /// Get length
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureString([REDACTED {} bytes])", self.len())
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

// Plaintext on the wire. Only the state file (0600) serializes key material.
impl Serialize for SecureString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.inner)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

/// Audit log entry for key material operations
#[derive(Debug, Clone)]
pub struct AuditLog {
    pub operation: String,
    pub target: String,
    pub backend: String,
    pub success: bool,
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AuditLog {
    pub fn new(
        operation: impl Into<String>,
        target: impl Into<String>,
        backend: impl Into<String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            target: target.into(),
            backend: backend.into(),
            success: true,
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_error(mut self, error: &str) -> Self {
        self.success = false;
        self.error = Some(sanitize_error(error));
        self
    }

    /// Log the audit entry (never logs secret values)
    pub fn log(&self) {
        if self.success {
            tracing::info!(
                operation = %self.operation,
                target = %self.target,
                backend = %self.backend,
                timestamp = %self.timestamp,
                "Secret operation successful"
            );
        } else {
            tracing::warn!(
                operation = %self.operation,
                target = %self.target,
                backend = %self.backend,
                error = ?self.error,
                timestamp = %self.timestamp,
                "Secret operation failed"
            );
        }
    }
}

/// Sanitize error messages to remove potential secret values
pub fn sanitize_error(error: &str) -> String {
    let patterns_to_redact = [
        // Explicit assignments
        (r"(?i)(secret[_-]?access[_-]?key|password|token)\s*[=:]\s*\S+", "$1=[REDACTED]"),
        // AWS secret access keys are 40 characters of base64
        (r"\b[A-Za-z0-9/+]{40}\b", "[REDACTED_SECRET]"),
        // Long base64 blobs
        (r"[A-Za-z0-9+/]{48,}={0,2}", "[REDACTED_BASE64]"),
    ];

    let mut sanitized = error.to_string();

    for (pattern, replacement) in patterns_to_redact {
        if let Ok(re) = regex::Regex::new(pattern) {
            sanitized = re.replace_all(&sanitized, replacement).to_string();
        }
    }

    sanitized
}
