//! Type definitions shared across pushkey crates

pub mod identity;
pub mod policy;

pub use identity::*;
pub use policy::*;
