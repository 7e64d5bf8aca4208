//! # pushkey-core
//!
//! Core library for the pushkey CLI providing:
//! - Configuration file parsing (pushkey.yaml)
//! - The shared error taxonomy
//! - Identity and authorization document types
//! - The least-privilege registry push policy builder

pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::PushkeyConfig;
pub use error::{Error, Result};
pub use policy::PolicyBuilder;
