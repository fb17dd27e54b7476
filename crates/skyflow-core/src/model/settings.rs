use skyflow_cloud::ApplyMode;
use skyflow_cloud::state::DEFAULT_STATE_DIR;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// `settings { ... }` block. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub parallel: Option<bool>,
    pub max_concurrency: Option<usize>,
    pub state_dir: Option<PathBuf>,
}

impl Settings {
    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(false)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn state_dir(&self) -> &Path {
        self.state_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_STATE_DIR))
    }

    pub fn apply_mode(&self) -> ApplyMode {
        if self.parallel() {
            ApplyMode::Parallel {
                max_concurrency: self.max_concurrency(),
            }
        } else {
            ApplyMode::Sequential
        }
    }

    /// Fields set in `other` win
    pub fn merge(&mut self, other: Settings) {
        if other.parallel.is_some() {
            self.parallel = other.parallel;
        }
        if other.max_concurrency.is_some() {
            self.max_concurrency = other.max_concurrency;
        }
        if other.state_dir.is_some() {
            self.state_dir = other.state_dir;
        }
    }
}
