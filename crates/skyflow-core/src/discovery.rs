//! Project file discovery
//!
//! Finds the project root and the KDL files that make up a topology.

use crate::error::{Result, TopologyError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable overriding project root discovery
pub const PROJECT_ROOT_ENV: &str = "SKYFLOW_PROJECT_ROOT";

/// Root topology file name
pub const ROOT_FILE: &str = "skyflow.kdl";

/// Local override file name, meant to stay out of version control
pub const LOCAL_FILE: &str = "skyflow.local.kdl";

/// Directory that may hold the topology files and holds state by default
pub const PROJECT_DIR: &str = ".skyflow";

/// Directory of additional resource files
pub const RESOURCES_DIR: &str = "resources";

/// Files found in a project
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    /// Root file (skyflow.kdl)
    pub root: Option<PathBuf>,
    /// Additional files (resources/**/*.kdl), alphabetical
    pub resources: Vec<PathBuf>,
    /// Local override file (skyflow.local.kdl)
    pub local_override: Option<PathBuf>,
}

impl DiscoveredFiles {
    /// All files in load order: root, resources, local override
    pub fn load_order(&self) -> Vec<&Path> {
        self.root
            .iter()
            .chain(self.resources.iter())
            .chain(self.local_override.iter())
            .map(PathBuf::as_path)
            .collect()
    }
}

fn has_root_file(dir: &Path) -> bool {
    dir.join(ROOT_FILE).exists() || dir.join(PROJECT_DIR).join(ROOT_FILE).exists()
}

/// Find the project root
///
/// In order of priority:
/// 1. the `SKYFLOW_PROJECT_ROOT` environment variable
/// 2. walking up from the current directory, the first directory holding
///    `skyflow.kdl` or `.skyflow/skyflow.kdl`
#[tracing::instrument]
pub fn find_project_root() -> Result<PathBuf> {
    if let Ok(root) = std::env::var(PROJECT_ROOT_ENV) {
        let path = PathBuf::from(&root);
        debug!(env_root = %root, "Checking {}", PROJECT_ROOT_ENV);
        if has_root_file(&path) {
            info!(project_root = %path.display(), "Found project root from environment variable");
            return Ok(path);
        }
        warn!(env_root = %root, "{} has no {}, ignoring", PROJECT_ROOT_ENV, ROOT_FILE);
    }

    let start_dir = std::env::current_dir()?;
    find_project_root_from(&start_dir)
}

/// Walk up from `start_dir` looking for a project root
#[tracing::instrument(skip(start_dir), fields(start_dir = %start_dir.display()))]
pub fn find_project_root_from(start_dir: &Path) -> Result<PathBuf> {
    let mut current = start_dir.to_path_buf();
    debug!("Searching for project root");

    loop {
        debug!(checking = %current.display(), "Looking for {}", ROOT_FILE);
        if has_root_file(&current) {
            info!(project_root = %current.display(), "Found project root");
            return Ok(current);
        }

        if !current.pop() {
            break;
        }
    }

    warn!("Project root not found");
    Err(TopologyError::ProjectRootNotFound(start_dir.to_path_buf()))
}

/// Discover the topology files of a project
#[tracing::instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn discover_files(project_root: &Path) -> Result<DiscoveredFiles> {
    debug!("Starting file discovery");
    let mut discovered = DiscoveredFiles::default();

    // skyflow.kdl, then .skyflow/skyflow.kdl
    discovered.root = first_existing(project_root, ROOT_FILE);
    if let Some(root) = &discovered.root {
        debug!(file = %root.display(), "Found root file");
    }

    // resources/**/*.kdl
    let resources_dir = project_root.join(RESOURCES_DIR);
    if resources_dir.is_dir() {
        discovered.resources = discover_kdl_files(&resources_dir)?;
        info!(
            resource_files = discovered.resources.len(),
            "Discovered resource files"
        );
    }

    // skyflow.local.kdl, then .skyflow/skyflow.local.kdl
    discovered.local_override = first_existing(project_root, LOCAL_FILE);
    if let Some(local) = &discovered.local_override {
        debug!(file = %local.display(), "Found local override file");
    }

    Ok(discovered)
}

fn first_existing(project_root: &Path, file_name: &str) -> Option<PathBuf> {
    [
        project_root.join(file_name),
        project_root.join(PROJECT_DIR).join(file_name),
    ]
    .into_iter()
    .find(|path| path.exists())
}

/// Find `.kdl` files below `dir`, sorted alphabetically
fn discover_kdl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut visited = HashSet::new();

    visit_dir(dir, &mut files, &mut visited)?;
    files.sort();

    Ok(files)
}

fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    // Symlink loops
    let canonical_dir = dir.canonicalize().map_err(|e| TopologyError::DiscoveryError {
        path: dir.to_path_buf(),
        message: format!("failed to canonicalize path: {}", e),
    })?;
    if !visited.insert(canonical_dir.clone()) {
        warn!(dir = %canonical_dir.display(), "Symlink loop detected, skipping");
        return Ok(());
    }

    let entries = std::fs::read_dir(dir).map_err(|e| TopologyError::DiscoveryError {
        path: dir.to_path_buf(),
        message: format!("failed to read directory: {}", e),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| TopologyError::DiscoveryError {
            path: dir.to_path_buf(),
            message: format!("failed to read directory entry: {}", e),
        })?;
        let path = entry.path();

        if path.is_dir() {
            visit_dir(&path, files, visited)?;
        } else if path.extension().and_then(|s| s.to_str()) == Some("kdl") {
            files.push(path);
        }
    }

    Ok(())
}
