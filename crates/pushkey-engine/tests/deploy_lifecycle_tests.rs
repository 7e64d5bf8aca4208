//! Deploy lifecycle integration tests
//!
//! Drives the orchestrator end to end against the in-memory cloud:
//! - First deploy and idempotent re-plan
//! - In-place updates and forced replacements
//! - Teardown and re-issue
//! - Policy document versions and policy replacement
//! - Failure surfacing and cached plan staleness

mod common;

use common::*;
use pushkey_core::Error;
use pushkey_engine::{Action, Node, Phase, Plan};
use serde_json::json;

#[cfg(test)]
mod deploy_lifecycle {
    use super::*;

    #[tokio::test]
    async fn test_first_deploy_provisions_everything() {
        let ws = TestWorkspace::new();
        let outputs = ws.orchestrator().deploy().await.unwrap().unwrap();

        let state = ws.state();
        assert_fully_provisioned(&state);
        assert_eq!(outputs.iter().count(), 6);

        let user = ws.cloud.user("github-actions-ecr").unwrap();
        assert_eq!(user.access_keys, vec![access_key_id(&state)]);
        assert_eq!(user.attached_policies.len(), 1);
        assert_eq!(
            user.identity.tags.get("ManagedBy").map(String::as_str),
            Some("pushkey")
        );
    }

    #[tokio::test]
    async fn test_replan_after_apply_has_no_changes() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let calls_after_deploy = ws.cloud.mutating_calls().len();

        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        let plan = orch.plan().unwrap().clone();
        assert_no_changes(&plan);

        orch.apply().await.unwrap();
        assert_eq!(ws.cloud.mutating_calls().len(), calls_after_deploy);
    }

    #[tokio::test]
    async fn test_destroy_then_apply_issues_new_key() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let first_key = access_key_id(&ws.state());

        let mut teardown = ws.orchestrator();
        teardown.initialize().await.unwrap();
        teardown.plan_destroy().unwrap();
        teardown.apply().await.unwrap();
        assert!(ws.state().is_empty());
        assert_eq!(ws.cloud.user_count(), 0);

        ws.orchestrator().deploy().await.unwrap();
        let second_key = access_key_id(&ws.state());
        assert_ne!(first_key, second_key);
    }

    #[tokio::test]
    async fn test_tag_change_keeps_access_key() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let key = access_key_id(&ws.state());

        ws.set_config("identity:\n  tags:\n    Purpose: ci\n    Team: platform\n");
        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        let plan = orch.plan().unwrap();
        assert_eq!(plan.action_for(Node::Identity), Some(Action::Update));
        assert_eq!(plan.summary().update, 1);
        orch.apply().await.unwrap();

        assert_eq!(access_key_id(&ws.state()), key);
        let tags = ws.cloud.user("github-actions-ecr").unwrap().identity.tags;
        assert_eq!(tags.get("Team").map(String::as_str), Some("platform"));
        assert!(!tags.contains_key("ManagedBy"));
    }

    #[tokio::test]
    async fn test_rename_replaces_identity_and_republishes() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let old_key = access_key_id(&ws.state());

        ws.set_config("identity:\n  name: ci-pusher\n");
        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        orch.plan().unwrap();
        orch.apply().await.unwrap();

        let state = ws.state();
        assert_fully_provisioned(&state);
        assert_ne!(access_key_id(&state), old_key);
        assert!(ws.cloud.user("github-actions-ecr").is_none());
        assert!(ws.cloud.user("ci-pusher").is_some());

        let param = ws
            .cloud
            .parameter("/ci-cd/github-actions/access-key-id")
            .unwrap();
        assert_eq!(param.value.as_str(), access_key_id(&state));
        assert_eq!(param.version, 2);
    }

    #[tokio::test]
    async fn test_kms_key_change_rewrites_parameters_only() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();

        ws.set_config("secrets:\n  kms_key_id: alias/ci-secrets\n");
        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        let plan = orch.plan().unwrap();
        assert_eq!(plan.summary().update, 2);
        assert_eq!(plan.action_for(Node::AccessKey), Some(Action::NoOp));
        orch.apply().await.unwrap();

        let param = ws
            .cloud
            .parameter("/ci-cd/github-actions/secret-access-key")
            .unwrap();
        assert_eq!(param.kms_key_id.as_deref(), Some("alias/ci-secrets"));
    }

    #[tokio::test]
    async fn test_foreign_identity_is_a_conflict() {
        let ws = TestWorkspace::new();
        ws.cloud.add_foreign_user("github-actions-ecr");

        let err = ws.orchestrator().deploy().await.unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
        assert!(err.to_string().contains("EntityAlreadyExists"));

        // The policy was created before the collision and stays tracked
        let state = ws.state();
        assert!(state.contains(Node::Policy));
        assert!(!state.contains(Node::Identity));
        assert!(ws.cloud.user("github-actions-ecr").unwrap().access_keys.is_empty());
    }

    #[tokio::test]
    async fn test_cached_plan_goes_stale() {
        let ws = TestWorkspace::new();

        let mut planner = ws.orchestrator();
        planner.initialize().await.unwrap();
        let cached: Plan = planner.plan().unwrap().clone();

        ws.orchestrator().deploy().await.unwrap();

        let mut applier = ws.orchestrator();
        applier.initialize().await.unwrap();
        let err = applier.use_plan(cached).unwrap_err();
        assert!(matches!(err, Error::StalePlan { .. }));
        assert_eq!(applier.phase(), Phase::Initialized);
    }

    #[tokio::test]
    async fn test_secret_never_leaves_sensitive_channels() {
        let ws = TestWorkspace::new();

        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        let plan_json = orch.plan().unwrap().to_json().unwrap();
        orch.apply().await.unwrap();
        let outputs = orch.report().unwrap().unwrap();

        let secret = outputs.get("secret_access_key").unwrap().reveal().to_string();
        let key_id = access_key_id(&ws.state());

        assert!(!plan_json.contains(&secret));
        let masked = serde_json::to_string(&outputs.masked()).unwrap();
        assert!(!masked.contains(&secret));
        assert!(!masked.contains(&key_id));
        assert!(!format!("{:?}", ws.state()).contains(&secret));

        // The state file is the one place the secret is kept
        assert!(ws.state_file_contents().contains(&secret));
    }

    #[tokio::test]
    async fn test_cached_plan_rejected_after_config_edit() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();

        ws.set_config("identity:\n  tags:\n    Team: platform\n");
        let mut planner = ws.orchestrator();
        planner.initialize().await.unwrap();
        let cached: Plan = planner.plan().unwrap().clone();
        assert_eq!(cached.action_for(Node::Identity), Some(Action::Update));

        ws.set_config("identity:\n  name: ci-pusher\n  tags:\n    Team: platform\n");
        let mut applier = ws.orchestrator();
        applier.initialize().await.unwrap();
        let err = applier.use_plan(cached).unwrap_err();
        assert!(matches!(err, Error::StalePlan { .. }));
        assert_eq!(applier.phase(), Phase::Initialized);

        let identity = ws.state().get(Node::Identity).cloned().unwrap();
        assert_eq!(identity.attr_str("name"), Some("github-actions-ecr"));
        assert!(ws.cloud.user("ci-pusher").is_none());

        // A fresh plan picks up the rename
        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        assert_eq!(
            orch.plan().unwrap().action_for(Node::Identity),
            Some(Action::Replace)
        );
        orch.apply().await.unwrap();
        assert!(ws.cloud.user("ci-pusher").is_some());
        assert!(ws.cloud.user("github-actions-ecr").is_none());
    }

    #[tokio::test]
    async fn test_policy_document_drift_publishes_new_versions() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let key = access_key_id(&ws.state());
        let arn = ws.state().get(Node::Policy).unwrap().id.clone();
        let document = ws.cloud.policy(&arn).unwrap().document().unwrap().to_string();

        for round in 2..=7 {
            let store = ws.store();
            let mut state = store.load().unwrap();
            state
                .get_mut(Node::Policy)
                .unwrap()
                .attributes
                .insert("document".to_string(), json!("{}"));
            store.save(&mut state).unwrap();

            let calls_before = ws.cloud.mutating_calls().len();
            let mut orch = ws.orchestrator();
            orch.initialize().await.unwrap();
            let plan = orch.plan().unwrap();
            assert_eq!(plan.action_for(Node::Policy), Some(Action::Update));
            assert_eq!(plan.summary().update, 1);
            orch.apply().await.unwrap();

            let calls = ws.cloud.mutating_calls();
            assert_eq!(
                calls[calls_before..].to_vec(),
                vec![format!("update_policy_document({})", arn)]
            );

            let policy = ws.state().get(Node::Policy).cloned().unwrap();
            assert_eq!(
                policy.attr_str("default_version_id"),
                Some(format!("v{}", round).as_str())
            );
            assert_eq!(policy.attr_str("document"), Some(document.as_str()));
        }

        // IAM keeps five versions; the oldest are pruned
        let policy = ws.cloud.policy(&arn).unwrap();
        let ids: Vec<&str> = policy.versions.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["v3", "v4", "v5", "v6", "v7"]);
        assert_eq!(policy.document(), Some(document.as_str()));
        assert_eq!(access_key_id(&ws.state()), key);

        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        assert_no_changes(orch.plan().unwrap());
    }

    #[tokio::test]
    async fn test_policy_description_change_replaces_policy() {
        let ws = TestWorkspace::new();
        ws.orchestrator().deploy().await.unwrap();
        let key = access_key_id(&ws.state());
        let arn = ws.state().get(Node::Policy).unwrap().id.clone();
        let calls_before = ws.cloud.mutating_calls().len();

        ws.set_config("policy:\n  description: Push access for CI\n");
        let mut orch = ws.orchestrator();
        orch.initialize().await.unwrap();
        let plan = orch.plan().unwrap();
        assert_eq!(plan.action_for(Node::Policy), Some(Action::Replace));
        assert_eq!(plan.action_for(Node::Attachment), Some(Action::Replace));
        assert_eq!(plan.action_for(Node::AccessKey), Some(Action::NoOp));
        orch.apply().await.unwrap();

        let calls = ws.cloud.mutating_calls()[calls_before..].to_vec();
        assert_eq!(
            calls,
            vec![
                format!("detach_user_policy(github-actions-ecr, {})", arn),
                format!("delete_policy({})", arn),
                "create_policy(github-actions-ecr-push)".to_string(),
                format!("attach_user_policy(github-actions-ecr, {})", arn),
            ]
        );

        let policy = ws.cloud.policy(&arn).unwrap();
        assert_eq!(policy.description, "Push access for CI");
        assert_eq!(policy.versions.len(), 1);
        assert_eq!(access_key_id(&ws.state()), key);
        assert_eq!(
            ws.cloud.user("github-actions-ecr").unwrap().attached_policies,
            vec![arn]
        );
    }
}
