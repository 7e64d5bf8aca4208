//! Deployment state machine
//!
//! A run moves strictly forward through
//! `Unverified -> Initialized -> Planned -> Applied -> Reported`.
//! Each step is a method; calling one out of order fails with
//! `InvalidTransition` and changes nothing.

use crate::apply::{Applier, ApplyReport};
use crate::blueprint::Blueprint;
use crate::outputs::Outputs;
use crate::plan::{self, Plan};
use crate::state::{StateFile, StateStore};
use pushkey_cloud::{resolve_caller, Backends};
use pushkey_core::types::CallerIdentity;
use pushkey_core::{Error, PushkeyConfig, Result};
use pushkey_secrets::SecretPublisher;
use std::fmt;
use tracing::{debug, info, warn};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Unverified,
    Initialized,
    Planned,
    Applied,
    Reported,
}

impl Phase {
    fn next(self) -> Option<Phase> {
        match self {
            Phase::Unverified => Some(Phase::Initialized),
            Phase::Initialized => Some(Phase::Planned),
            Phase::Planned => Some(Phase::Applied),
            Phase::Applied => Some(Phase::Reported),
            Phase::Reported => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Unverified => "unverified",
            Phase::Initialized => "initialized",
            Phase::Planned => "planned",
            Phase::Applied => "applied",
            Phase::Reported => "reported",
        };
        f.write_str(s)
    }
}

/// Drives one provisioning or teardown run
pub struct Orchestrator {
    config: PushkeyConfig,
    backends: Backends,
    store: StateStore,
    phase: Phase,
    caller: Option<CallerIdentity>,
    blueprint: Option<Blueprint>,
    state: StateFile,
    plan: Option<Plan>,
    report: Option<ApplyReport>,
}

impl Orchestrator {
    pub fn new(config: PushkeyConfig, backends: Backends) -> Self {
        let store = StateStore::new(config.state_dir());
        Self {
            config,
            backends,
            store,
            phase: Phase::Unverified,
            caller: None,
            blueprint: None,
            state: StateFile::default(),
            plan: None,
            report: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn caller(&self) -> Option<&CallerIdentity> {
        self.caller.as_ref()
    }

    pub fn state(&self) -> &StateFile {
        &self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn current_plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    fn advance(&mut self, to: Phase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(Error::invalid_transition(self.phase, to));
        }
        debug!("Phase {} -> {}", self.phase, to);
        self.phase = to;
        Ok(())
    }

    fn expect_phase(&self, to: Phase) -> Result<()> {
        if self.phase.next() == Some(to) {
            Ok(())
        } else {
            Err(Error::invalid_transition(self.phase, to))
        }
    }

    /// Resolve the caller and open the state directory
    ///
    /// Fails before touching anything when the session is unauthenticated.
    pub async fn initialize(&mut self) -> Result<&CallerIdentity> {
        self.expect_phase(Phase::Initialized)?;

        let caller = resolve_caller(self.backends.resolver.as_ref()).await?;
        let blueprint = Blueprint::new(&self.config, &caller)?;
        self.store.ensure_dir()?;
        self.state = self.store.load()?;

        self.blueprint = Some(blueprint);
        self.advance(Phase::Initialized)?;
        Ok(self.caller.insert(caller))
    }

    /// Compute the diff; never mutates state or cloud
    pub fn plan(&mut self) -> Result<&Plan> {
        self.expect_phase(Phase::Planned)?;
        let blueprint = self.blueprint()?;
        let plan = plan::plan(blueprint, &self.state)?;
        info!("Plan: {}", plan.summary());
        self.install_plan(plan)
    }

    /// Compute a teardown of everything in state
    pub fn plan_destroy(&mut self) -> Result<&Plan> {
        self.expect_phase(Phase::Planned)?;
        let caller = self.caller_or_err()?;
        let plan = plan::plan_destroy(&self.state, caller)?;
        info!("Destroy plan: {}", plan.summary());
        self.install_plan(plan)
    }

    /// Adopt a cached plan if it still matches state and caller
    pub fn use_plan(&mut self, plan: Plan) -> Result<&Plan> {
        self.expect_phase(Phase::Planned)?;
        plan.check_current(&self.state, self.blueprint()?)?;
        self.install_plan(plan)
    }

    fn install_plan(&mut self, plan: Plan) -> Result<&Plan> {
        self.advance(Phase::Planned)?;
        Ok(self.plan.insert(plan))
    }

    /// Execute the current plan
    pub async fn apply(&mut self) -> Result<&ApplyReport> {
        self.expect_phase(Phase::Applied)?;
        let plan = self
            .plan
            .clone()
            .ok_or_else(|| Error::invalid_transition(self.phase, Phase::Applied))?;

        let applier = Applier::new(
            self.backends.iam.clone(),
            SecretPublisher::new(
                self.backends.parameters.clone(),
                self.config.secrets().kms_key_id.clone(),
            ),
            self.store.clone(),
        );

        let report = if plan.destroy {
            applier.destroy(&plan, &mut self.state).await?
        } else {
            let blueprint = self
                .blueprint
                .clone()
                .ok_or_else(|| Error::invalid_transition(Phase::Unverified, Phase::Applied))?;
            applier.apply(&plan, &blueprint, &mut self.state).await?
        };

        info!("Applied {} change(s)", report.steps.len());
        self.advance(Phase::Applied)?;
        Ok(self.report.insert(report))
    }

    /// Read outputs back from the persisted state
    ///
    /// Best-effort: a failure is logged and yields `None`.
    pub fn report(&mut self) -> Result<Option<Outputs>> {
        self.advance(Phase::Reported)?;
        match self.store.load() {
            Ok(state) => Ok(Some(Outputs::from_state(&state))),
            Err(e) => {
                warn!("Could not read outputs from {}: {}", self.store.path(), e);
                Ok(None)
            }
        }
    }

    /// Run every phase in order
    pub async fn deploy(&mut self) -> Result<Option<Outputs>> {
        self.initialize().await?;
        self.plan()?;
        self.apply().await?;
        self.report()
    }

    fn blueprint(&self) -> Result<&Blueprint> {
        self.blueprint
            .as_ref()
            .ok_or_else(|| Error::invalid_transition(self.phase, Phase::Planned))
    }

    fn caller_or_err(&self) -> Result<&CallerIdentity> {
        self.caller
            .as_ref()
            .ok_or_else(|| Error::invalid_transition(self.phase, Phase::Planned))
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase)
            .field("store", &self.store)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use pushkey_cloud::memory::InMemoryCloud;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn orchestrator(cloud: &Arc<InMemoryCloud>) -> (Orchestrator, TempDir) {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().join("pushkey.yaml")).unwrap();
        let config = PushkeyConfig::parse("", path).unwrap();
        (Orchestrator::new(config, cloud.backends()), temp)
    }

    #[tokio::test]
    async fn test_plan_before_initialize_is_rejected() {
        let cloud = Arc::new(InMemoryCloud::default());
        let (mut orch, _temp) = orchestrator(&cloud);

        let err = orch.plan().unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(err.to_string(), "Invalid transition from unverified to planned");
        assert_eq!(orch.phase(), Phase::Unverified);
    }

    #[tokio::test]
    async fn test_apply_twice_is_rejected() {
        let cloud = Arc::new(InMemoryCloud::default());
        let (mut orch, _temp) = orchestrator(&cloud);
        orch.initialize().await.unwrap();
        orch.plan().unwrap();
        orch.apply().await.unwrap();

        assert!(matches!(
            orch.apply().await,
            Err(Error::InvalidTransition { .. })
        ));
        assert_eq!(orch.phase(), Phase::Applied);
    }

    #[tokio::test]
    async fn test_unauthenticated_has_no_side_effects() {
        let cloud = Arc::new(InMemoryCloud::unauthenticated());
        let (mut orch, _temp) = orchestrator(&cloud);

        let err = orch.deploy().await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(orch.phase(), Phase::Unverified);
        assert!(cloud.mutating_calls().is_empty());
        assert!(!orch.store().dir().exists());
    }

    #[tokio::test]
    async fn test_missing_region_fails_fast() {
        let cloud = Arc::new(InMemoryCloud::without_region());
        let (mut orch, _temp) = orchestrator(&cloud);

        assert!(matches!(
            orch.initialize().await,
            Err(Error::MissingRegion)
        ));
        assert!(cloud.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_reports_outputs() {
        let cloud = Arc::new(InMemoryCloud::default());
        let (mut orch, _temp) = orchestrator(&cloud);

        let outputs = orch.deploy().await.unwrap().unwrap();
        assert_eq!(orch.phase(), Phase::Reported);
        assert_eq!(outputs.iter().count(), 6);
        assert_eq!(
            outputs.get("access_key_id_parameter").unwrap().reveal(),
            "/ci-cd/github-actions/access-key-id"
        );
    }

    #[tokio::test]
    async fn test_report_tolerates_unreadable_state() {
        let cloud = Arc::new(InMemoryCloud::default());
        let (mut orch, _temp) = orchestrator(&cloud);
        orch.initialize().await.unwrap();
        orch.plan().unwrap();
        orch.apply().await.unwrap();

        std::fs::write(orch.store().path(), "not json").unwrap();
        assert!(orch.report().unwrap().is_none());
        assert_eq!(orch.phase(), Phase::Reported);
    }
}
