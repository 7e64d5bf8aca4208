//! One-shot reveal of freshly issued key material
//!
//! IAM hands out the secret half of an access key exactly once, in the
//! response to the create call. [`OneShotSecret`] carries that response to
//! whoever persists it and refuses to hand it out a second time.

use crate::security::SecureString;
use pushkey_core::{Error, Result};
use std::fmt;

/// Secret material that can be taken at most once
pub struct OneShotSecret {
    key_id: String,
    slot: Option<SecureString>,
}

impl OneShotSecret {
    /// Wrap the secret returned alongside `key_id`
    pub fn new(key_id: impl Into<String>, secret: SecureString) -> Self {
        Self {
            key_id: key_id.into(),
            slot: Some(secret),
        }
    }

    /// Key id the secret belongs to
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Take the secret; every later call fails with `SecretAlreadyRevealed`
    pub fn take(&mut self) -> Result<SecureString> {
        self.slot.take().ok_or_else(|| Error::SecretAlreadyRevealed {
            key_id: self.key_id.clone(),
        })
    }

    /// Whether the secret has already been taken
    pub fn is_revealed(&self) -> bool {
        self.slot.is_none()
    }
}

impl fmt::Debug for OneShotSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OneShotSecret")
            .field("key_id", &self.key_id)
            .field("revealed", &self.is_revealed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_once() {
        let mut secret = OneShotSecret::new("AKIAEXAMPLE", SecureString::from("s3cr3t"));
        assert!(!secret.is_revealed());

        let value = secret.take().unwrap();
        assert_eq!(value.as_str(), "s3cr3t");
        assert!(secret.is_revealed());
    }

    #[test]
    fn test_second_take_fails_closed() {
        let mut secret = OneShotSecret::new("AKIAEXAMPLE", SecureString::from("s3cr3t"));
        let _ = secret.take().unwrap();

        match secret.take() {
            Err(Error::SecretAlreadyRevealed { key_id }) => assert_eq!(key_id, "AKIAEXAMPLE"),
            other => panic!("expected SecretAlreadyRevealed, got {:?}", other),
        }
    }

    #[test]
    fn test_debug_hides_value() {
        let secret = OneShotSecret::new("AKIAEXAMPLE", SecureString::from("s3cr3t"));
        let rendered = format!("{:?}", secret);
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("s3cr3t"));
    }
}
