//! KDL parser
//!
//! Parses Skyflow topology documents. Each top-level node type has its own
//! module.

mod export;
mod keypair;
mod resource;
mod settings;

use export::parse_export;
use keypair::parse_keypair;
use settings::parse_settings;

pub use resource::{parse_property, parse_resource};

use crate::error::{Result, TopologyError};
use crate::model::Topology;
use kdl::{KdlDocument, KdlNode};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse a KDL file into a topology named after its directory
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Topology> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| TopologyError::IoError {
        path: path.as_ref().to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// Parse a KDL document.
///
/// Names must be unique per document; overriding happens between files
/// through [`Topology::merge`].
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Topology> {
    let doc: KdlDocument = content.parse()?;
    let mut topology = Topology::new(default_name);

    let mut resources = HashSet::new();
    let mut exports = HashSet::new();
    let mut keypairs = HashSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(project_name) = first_string(node) {
                    topology.name = project_name.to_string();
                }
            }
            "settings" => {
                let settings = parse_settings(node)?;
                topology.settings.merge(settings);
            }
            "resource" => {
                let decl = parse_resource(node)?;
                if !resources.insert(decl.name.clone()) {
                    return Err(duplicate("resource", &decl.name));
                }
                topology.declarations.push(decl);
            }
            "export" => {
                let export = parse_export(node)?;
                if !exports.insert(export.name.clone()) {
                    return Err(duplicate("export", &export.name));
                }
                topology.exports.push(export);
            }
            "keypair" => {
                let binding = parse_keypair(node)?;
                if !keypairs.insert(binding.name.clone()) {
                    return Err(duplicate("keypair", &binding.name));
                }
                topology.secrets.push(binding);
            }
            other => {
                debug!(node = other, "Skipping unknown top-level node");
            }
        }
    }

    Ok(topology)
}

fn duplicate(what: &str, name: &str) -> TopologyError {
    TopologyError::InvalidConfig(format!("{} '{}' is declared more than once", what, name))
}

/// First argument of a node as a string
pub(crate) fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
}

/// Positional (unnamed) arguments of a node
pub(crate) fn arguments(node: &KdlNode) -> impl Iterator<Item = &kdl::KdlEntry> {
    node.entries().iter().filter(|e| e.name().is_none())
}
