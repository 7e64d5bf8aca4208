//! Diffing desired resources against state

use crate::blueprint::Blueprint;
use crate::graph::ResourceGraph;
use crate::resource::Node;
use crate::state::StateFile;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use pushkey_core::types::CallerIdentity;
use pushkey_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Plan artifact format version
pub const PLAN_FORMAT_VERSION: u32 = 1;

/// What apply will do to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Create,
    Update,
    Replace,
    Delete,
}

impl Action {
    /// Whether the existing cloud resource is removed
    pub fn deletes(&self) -> bool {
        matches!(self, Action::Replace | Action::Delete)
    }

    /// Whether a new cloud resource is created
    pub fn creates(&self) -> bool {
        matches!(self, Action::Create | Action::Replace)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Action::NoOp => " ",
            Action::Create => "+",
            Action::Update => "~",
            Action::Replace => "-/+",
            Action::Delete => "-",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::NoOp => "no-op",
            Action::Create => "create",
            Action::Update => "update",
            Action::Replace => "replace",
            Action::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// One planned resource change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedChange {
    pub node: Node,
    pub action: Action,

    /// Names of desired attributes that differ from state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_attributes: Vec<String>,

    /// Dependency whose replacement forces this change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_by: Option<Node>,
}

/// Counts of changes by action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete",
            self.create, self.update, self.replace, self.delete
        )
    }
}

/// A computed diff, optionally cached to disk between `plan` and `apply`
///
/// Contains resource addresses and attribute names only, never values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub format_version: u32,

    /// Lineage of the state the plan was computed against
    pub lineage: Option<String>,

    /// Serial of the state the plan was computed against
    pub serial: u64,

    /// Caller the plan was computed as
    pub caller: CallerIdentity,

    /// Whether this plan tears everything down
    #[serde(default)]
    pub destroy: bool,

    /// Fingerprint of the desired configuration; unset for teardown plans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint_digest: Option<String>,

    /// Changes in execution order, no-ops included
    pub changes: Vec<PlannedChange>,

    pub created_at: DateTime<Utc>,
}

impl Plan {
    fn empty(state: &StateFile, caller: &CallerIdentity, destroy: bool) -> Self {
        Self {
            format_version: PLAN_FORMAT_VERSION,
            lineage: state.lineage.clone(),
            serial: state.serial,
            caller: caller.clone(),
            destroy,
            blueprint_digest: None,
            changes: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Whether applying the plan would change anything
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action != Action::NoOp)
    }

    pub fn action_for(&self, node: Node) -> Option<Action> {
        self.change_for(node).map(|c| c.action)
    }

    pub fn change_for(&self, node: Node) -> Option<&PlannedChange> {
        self.changes.iter().find(|c| c.node == node)
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for change in &self.changes {
            match change.action {
                Action::Create => summary.create += 1,
                Action::Update => summary.update += 1,
                Action::Replace => summary.replace += 1,
                Action::Delete => summary.delete += 1,
                Action::NoOp => {}
            }
        }
        summary
    }

    /// Reject the plan if state, caller or configuration moved since it was
    /// computed
    pub fn check_current(&self, state: &StateFile, blueprint: &Blueprint) -> Result<()> {
        let caller = &blueprint.caller;
        if self.format_version != PLAN_FORMAT_VERSION {
            return Err(Error::stale_plan(format!(
                "plan format {} is not supported",
                self.format_version
            )));
        }
        if self.lineage != state.lineage {
            return Err(Error::stale_plan(
                "plan was computed against a different state lineage",
            ));
        }
        if self.serial != state.serial {
            return Err(Error::stale_plan(format!(
                "state serial moved from {} to {}; run plan again",
                self.serial, state.serial
            )));
        }
        if self.caller.account != caller.account || self.caller.region != caller.region {
            return Err(Error::stale_plan(format!(
                "plan targets account {} in {}, current session is account {} in {}",
                self.caller.account, self.caller.region, caller.account, caller.region
            )));
        }
        if let Some(digest) = &self.blueprint_digest {
            if *digest != blueprint.fingerprint()? {
                return Err(Error::stale_plan(
                    "configuration changed since the plan was computed; run plan again",
                ));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Cache the plan as a JSON artifact
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        debug!("Wrote plan to {}", path);
        Ok(())
    }

    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::invalid_config(format!("plan file {} not found", path))
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_json(&content)
    }
}

/// Compute the changes that converge state onto the blueprint
pub fn plan(blueprint: &Blueprint, state: &StateFile) -> Result<Plan> {
    let order = ResourceGraph::new().topological_order()?;
    let mut plan = Plan::empty(state, &blueprint.caller, false);
    plan.blueprint_digest = Some(blueprint.fingerprint()?);
    let mut decided: HashMap<Node, Action> = HashMap::new();

    for node in order {
        let change = plan_node(node, blueprint, state, &decided);
        debug!("{}: {}", node, change.action);
        decided.insert(node, change.action);
        plan.changes.push(change);
    }

    Ok(plan)
}

fn plan_node(
    node: Node,
    blueprint: &Blueprint,
    state: &StateFile,
    decided: &HashMap<Node, Action>,
) -> PlannedChange {
    let Some(current) = state.get(node) else {
        return PlannedChange {
            node,
            action: Action::Create,
            changed_attributes: Vec::new(),
            forced_by: None,
        };
    };

    let changed_attributes: Vec<String> = blueprint
        .desired(node)
        .into_iter()
        .filter(|(name, value)| current.attributes.get(name) != Some(value))
        .map(|(name, _)| name)
        .collect();

    let forced_by = node
        .dependencies()
        .iter()
        .copied()
        .find(|dep| decided.get(dep).is_some_and(Action::creates));

    let immutable_changed = changed_attributes
        .iter()
        .any(|a| node.immutable_attributes().contains(&a.as_str()));

    let action = if immutable_changed || (forced_by.is_some() && node.replaced_with_parent()) {
        Action::Replace
    } else if !changed_attributes.is_empty() || forced_by.is_some() {
        Action::Update
    } else {
        Action::NoOp
    };

    PlannedChange {
        node,
        action,
        changed_attributes,
        forced_by,
    }
}

/// Plan that deletes every managed resource in state
pub fn plan_destroy(state: &StateFile, caller: &CallerIdentity) -> Result<Plan> {
    let order = ResourceGraph::from_nodes(&state.nodes()).reverse_order()?;
    let mut plan = Plan::empty(state, caller, true);
    plan.changes = order
        .into_iter()
        .map(|node| PlannedChange {
            node,
            action: Action::Delete,
            changed_attributes: Vec::new(),
            forced_by: None,
        })
        .collect();
    Ok(plan)
}
