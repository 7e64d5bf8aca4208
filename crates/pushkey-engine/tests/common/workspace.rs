//! Temporary pushkey workspaces

use camino::Utf8PathBuf;
use pushkey_cloud::memory::InMemoryCloud;
use pushkey_core::PushkeyConfig;
use pushkey_engine::{Orchestrator, StateFile, StateStore};
use std::sync::Arc;
use tempfile::TempDir;

/// A config file in a temp dir plus the cloud it deploys into
pub struct TestWorkspace {
    pub cloud: Arc<InMemoryCloud>,
    pub config_path: Utf8PathBuf,
    _temp: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self::with_config("")
    }

    pub fn with_config(yaml: &str) -> Self {
        Self::with_cloud(Arc::new(InMemoryCloud::default()), yaml)
    }

    pub fn with_cloud(cloud: Arc<InMemoryCloud>, yaml: &str) -> Self {
        let temp = TempDir::new().unwrap();
        let config_path = Utf8PathBuf::try_from(temp.path().join("pushkey.yaml")).unwrap();
        std::fs::write(&config_path, yaml).unwrap();
        Self {
            cloud,
            config_path,
            _temp: temp,
        }
    }

    /// Rewrite the config file
    pub fn set_config(&self, yaml: &str) {
        std::fs::write(&self.config_path, yaml).unwrap();
    }

    pub fn config(&self) -> PushkeyConfig {
        PushkeyConfig::load(Some(self.config_path.as_path())).unwrap()
    }

    /// A fresh orchestrator, as a new CLI invocation would build
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(self.config(), self.cloud.backends())
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.config().state_dir())
    }

    pub fn state(&self) -> StateFile {
        self.store().load().unwrap()
    }

    pub fn state_file_contents(&self) -> String {
        std::fs::read_to_string(self.store().path()).unwrap_or_default()
    }
}
