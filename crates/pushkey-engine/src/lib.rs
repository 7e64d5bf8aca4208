//! # pushkey-engine
//!
//! Reconciles the CI credential resources against a local state file:
//! - **Graph**: six resource nodes ordered with `petgraph`
//! - **Blueprint**: desired attributes derived from config and the caller
//! - **State**: locked, atomically replaced JSON state file
//! - **Plan**: create / update / replace / delete diff, cacheable as JSON
//! - **Apply**: dependency-ordered execution, state saved after every node
//! - **Orchestrator**: the deploy state machine tying it together

pub mod apply;
pub mod blueprint;
pub mod graph;
pub mod orchestrator;
pub mod outputs;
pub mod plan;
pub mod resource;
pub mod state;

pub use apply::{Applier, ApplyReport};
pub use blueprint::Blueprint;
pub use graph::ResourceGraph;
pub use orchestrator::{Orchestrator, Phase};
pub use outputs::{Output, Outputs, OUTPUT_NAMES};
pub use plan::{plan, plan_destroy, Action, Plan, PlanSummary, PlannedChange};
pub use resource::{Node, ResourceState};
pub use state::{StateFile, StateStore, STATE_FILE_NAME};
