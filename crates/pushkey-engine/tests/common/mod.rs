//! Common test utilities for pushkey-engine
//!
//! Provides shared test infrastructure including:
//! - A workspace with a config file and state directory
//! - Orchestrator construction over the in-memory cloud
//! - Assertions over state and plans

pub mod assertions;
pub mod workspace;

pub use assertions::*;
pub use workspace::*;
