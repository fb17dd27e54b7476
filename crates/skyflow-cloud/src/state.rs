//! State management for applied resources
//!
//! Manages the `.skyflow/state.json` file which records, per declared
//! resource, the provider id, the resolved properties it was applied with and
//! its outputs. This is what makes a re-run of `apply` a no-op.

use crate::error::{CloudError, Result};
use crate::graph::NodeStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

const STATE_VERSION: u32 = 1;
pub const DEFAULT_STATE_DIR: &str = ".skyflow";
const STATE_FILE: &str = "state.json";
const STATE_BACKUP: &str = "state.json.backup";
const STATE_STAGED: &str = "state.json.tmp";
const LOCK_FILE: &str = "lock.json";
pub const STALE_LOCK_HOURS: i64 = 1;

/// Global state containing all applied resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Resources indexed by kind:name
    pub resources: BTreeMap<String, ResourceState>,
}

impl Default for GlobalState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            resources: BTreeMap::new(),
        }
    }
}

impl GlobalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State key for a resource
    pub fn key(kind: &str, name: &str) -> String {
        format!("{}:{}", kind, name)
    }

    /// Add or update a resource
    pub fn set_resource(&mut self, key: String, state: ResourceState) {
        self.resources.insert(key, state);
        self.updated_at = Utc::now();
    }

    /// Remove a resource
    pub fn remove_resource(&mut self, key: &str) -> Option<ResourceState> {
        let result = self.resources.remove(key);
        if result.is_some() {
            self.updated_at = Utc::now();
        }
        result
    }

    /// Get a resource by key
    pub fn get_resource(&self, key: &str) -> Option<&ResourceState> {
        self.resources.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// State of a single applied resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider-specific resource ID
    pub id: String,

    /// Resource kind
    pub resource_type: String,

    /// Current status
    pub status: NodeStatus,

    /// Resolved input properties the resource was last applied with
    #[serde(default)]
    pub properties: Value,

    /// Resource outputs (IP, ARN, etc.)
    pub attributes: Map<String, Value>,

    /// When the resource was created
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            status: NodeStatus::Applied,
            properties: Value::Null,
            attributes: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_attributes(mut self, attributes: Map<String, Value>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Keep the original creation time when replacing a record
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn get_attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Reads and writes the state directory of a project.
///
/// `save` never leaves the directory without a `state.json`: the new state is
/// written next to it and renamed over it, after the previous version has
/// been copied to `state.json.backup`.
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self::with_state_dir(project_root, DEFAULT_STATE_DIR)
    }

    /// Use a custom state directory, relative to the project root unless absolute
    pub fn with_state_dir(project_root: impl AsRef<Path>, state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: project_root.as_ref().join(state_dir),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn file(&self, name: &str) -> PathBuf {
        self.state_dir.join(name)
    }

    pub async fn load(&self) -> Result<GlobalState> {
        let path = self.file(STATE_FILE);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No state yet");
                return Ok(GlobalState::new());
            }
            Err(e) => return Err(e.into()),
        };

        let state: GlobalState = serde_json::from_str(&content)?;
        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "{} has version {}, this build reads up to {}",
                path.display(),
                state.version,
                STATE_VERSION
            )));
        }

        tracing::debug!(resources = state.resources.len(), "Loaded state");
        Ok(state)
    }

    pub async fn save(&self, state: &GlobalState) -> Result<()> {
        fs::create_dir_all(&self.state_dir).await?;

        let path = self.file(STATE_FILE);
        let staged = self.file(STATE_STAGED);
        fs::write(&staged, serde_json::to_vec_pretty(state)?).await?;

        if fs::try_exists(&path).await? {
            fs::copy(&path, self.file(STATE_BACKUP)).await?;
        }
        fs::rename(&staged, &path).await?;

        tracing::debug!(resources = state.resources.len(), "Saved state");
        Ok(())
    }

    /// Take the state lock.
    ///
    /// The lock file is created exclusively, so two runs cannot both hold it.
    /// A lock older than [`STALE_LOCK_HOURS`] is assumed abandoned and taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        fs::create_dir_all(&self.state_dir).await?;
        let path = self.file(LOCK_FILE);
        let holder = LockInfo::current();

        match create_lock_file(&path, &holder).await {
            Err(CloudError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                let existing: LockInfo =
                    serde_json::from_str(&fs::read_to_string(&path).await?)?;
                let age = Utc::now().signed_duration_since(existing.acquired_at);
                if age.num_hours() < STALE_LOCK_HOURS {
                    return Err(CloudError::LockError(format!(
                        "state is locked by {} (pid {}) since {}",
                        existing.holder, existing.pid, existing.acquired_at
                    )));
                }
                tracing::warn!(holder = %existing.holder, "Taking over stale state lock");
                fs::remove_file(&path).await?;
                create_lock_file(&path, &holder).await?;
            }
            other => other?,
        }

        tracing::debug!(path = %path.display(), "Acquired state lock");
        Ok(StateLock {
            path,
            released: false,
        })
    }
}

async fn create_lock_file(path: &Path, info: &LockInfo) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(&serde_json::to_vec_pretty(info)?).await?;
    file.flush().await?;
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    #[serde(default)]
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockInfo {
    fn current() -> Self {
        Self {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }
}

/// Held state lock; the lock file is removed on `release` or drop
pub struct StateLock {
    path: PathBuf,
    released: bool,
}

impl StateLock {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!("Released state lock");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
