//! Project loader
//!
//! Ties discovery and parsing together.

use crate::discovery::{discover_files, find_project_root};
use crate::error::{Result, TopologyError};
use crate::model::Topology;
use crate::parser::parse_kdl_string;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Find the project root and load its topology
#[instrument]
pub fn load_project() -> Result<(PathBuf, Topology)> {
    info!("Starting project load");
    let project_root = find_project_root()?;
    let topology = load_project_from_root(&project_root)?;
    Ok((project_root, topology))
}

/// Load the topology of the project at `project_root`
///
/// Files are layered in order: `skyflow.kdl`, `resources/**/*.kdl`, then
/// `skyflow.local.kdl`. A later file replaces declarations, exports and key
/// pairs of the same name and overrides the settings it sets.
#[instrument(skip(project_root), fields(project_root = %project_root.display()))]
pub fn load_project_from_root(project_root: &Path) -> Result<Topology> {
    let discovered = discover_files(project_root)?;
    if discovered.root.is_none() {
        return Err(TopologyError::ProjectRootNotFound(project_root.to_path_buf()));
    }

    let default_name = project_root
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let mut topology: Option<Topology> = None;
    for path in discovered.load_order() {
        debug!(file = %path.display(), "Parsing");
        let content = std::fs::read_to_string(path).map_err(|e| TopologyError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if let Some(base) = topology.as_mut() {
            // Layers keep the base name unless they declare `project`
            base.merge(parse_kdl_string(&content, String::new())?);
        } else {
            topology = Some(parse_kdl_string(&content, default_name.clone())?);
        }
    }

    let topology = topology.unwrap_or_else(|| Topology::new(default_name));
    topology.validate()?;

    info!(
        project = %topology.name,
        resources = topology.declarations.len(),
        exports = topology.exports.len(),
        keypairs = topology.secrets.len(),
        "Project loaded successfully"
    );
    Ok(topology)
}
