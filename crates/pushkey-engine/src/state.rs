//! State file persistence
//!
//! The state file records every resource pushkey has created, keyed by node
//! address. It is the only place the secret access key is kept after issuance,
//! so it is written with owner-only permissions.
//!
//! Every read and write holds an exclusive advisory lock on a sibling lock
//! file. Writes go to a temporary file that is renamed over the state file.

use crate::resource::{Node, ResourceState};
use camino::{Utf8Path, Utf8PathBuf};
use fs4::fs_std::FileExt;
use pushkey_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use tracing::debug;

/// State file name inside the state directory
pub const STATE_FILE_NAME: &str = "pushkey.state.json";

const LOCK_FILE_NAME: &str = ".pushkey.state.lock";

/// Current state format version
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Persisted record of managed resources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,

    /// Assigned on first write and never changed afterwards
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lineage: Option<String>,

    /// Incremented on every write
    pub serial: u64,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            lineage: None,
            serial: 0,
            resources: BTreeMap::new(),
        }
    }
}

impl StateFile {
    pub fn get(&self, node: Node) -> Option<&ResourceState> {
        self.resources.get(node.address())
    }

    pub fn get_mut(&mut self, node: Node) -> Option<&mut ResourceState> {
        self.resources.get_mut(node.address())
    }

    /// Fetch a resource a dependent needs, failing if it is not in state
    pub fn require(&self, node: Node) -> Result<&ResourceState> {
        self.get(node)
            .ok_or_else(|| Error::missing_attribute(node.address(), "id"))
    }

    pub fn insert(&mut self, node: Node, resource: ResourceState) {
        self.resources.insert(node.address().to_string(), resource);
    }

    pub fn remove(&mut self, node: Node) -> Option<ResourceState> {
        self.resources.remove(node.address())
    }

    pub fn contains(&self, node: Node) -> bool {
        self.resources.contains_key(node.address())
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Managed nodes present in state
    pub fn nodes(&self) -> Vec<Node> {
        Node::ALL
            .into_iter()
            .filter(|n| self.contains(*n))
            .collect()
    }

    /// Addresses in state that do not name a managed node
    pub fn unknown_addresses(&self) -> Vec<&str> {
        self.resources
            .keys()
            .filter(|a| Node::from_address(a).is_none())
            .map(String::as_str)
            .collect()
    }
}

/// Reads and writes the state file in a state directory
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: Utf8PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path of the state file
    pub fn path(&self) -> Utf8PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Create the state directory if needed
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn lock(&self) -> Result<File> {
        self.ensure_dir()?;
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(LOCK_FILE_NAME))?;
        // Released when the handle is dropped
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Load the state; a missing file yields an empty state
    pub fn load(&self) -> Result<StateFile> {
        let path = self.path();
        if !path.exists() {
            debug!("No state at {}, starting empty", path);
            return Ok(StateFile::default());
        }

        let _lock = self.lock()?;
        let content = fs::read_to_string(&path)?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_FORMAT_VERSION {
            return Err(Error::invalid_config(format!(
                "{} uses state format {}, newer than supported format {}",
                path, state.version, STATE_FORMAT_VERSION
            )));
        }

        debug!(
            "Loaded state serial {} with {} resource(s)",
            state.serial,
            state.resources.len()
        );
        Ok(state)
    }

    /// Persist the state, bumping its serial and fixing its lineage
    pub fn save(&self, state: &mut StateFile) -> Result<()> {
        let _lock = self.lock()?;

        if state.lineage.is_none() {
            state.lineage = Some(uuid::Uuid::new_v4().to_string());
        }
        state.serial += 1;
        state.version = STATE_FORMAT_VERSION;

        let json = serde_json::to_string_pretty(state)?;
        let path = self.path();
        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE_NAME));

        {
            let mut file = owner_only(OpenOptions::new().create(true).write(true).truncate(true))
                .open(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!("Saved state serial {} to {}", state.serial, path);
        Ok(())
    }
}

#[cfg(unix)]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut OpenOptions) -> &mut OpenOptions {
    options
}
