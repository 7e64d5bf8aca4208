//! Assertions over engine results

use pushkey_engine::{Action, Node, Plan, StateFile};

/// Assert the plan changes nothing
pub fn assert_no_changes(plan: &Plan) {
    let pending: Vec<_> = plan
        .changes
        .iter()
        .filter(|c| c.action != Action::NoOp)
        .map(|c| format!("{} {}", c.action, c.node))
        .collect();
    assert!(pending.is_empty(), "expected no changes, got {:?}", pending);
}

/// Assert every managed node is tracked in state
pub fn assert_fully_provisioned(state: &StateFile) {
    for node in Node::ALL {
        assert!(state.contains(node), "{} missing from state", node);
    }
}

/// Access key id recorded in state
pub fn access_key_id(state: &StateFile) -> String {
    state
        .get(Node::AccessKey)
        .map(|k| k.id.clone())
        .expect("access key in state")
}
