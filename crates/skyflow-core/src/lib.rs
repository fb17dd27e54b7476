//! Skyflow topology definitions
//!
//! Reads `skyflow.kdl` projects into a [`Topology`]: resource declarations,
//! exports, key pair bindings and settings, ready to be handed to the
//! engine in `skyflow-cloud`.

pub mod discovery;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;

pub use discovery::{DiscoveredFiles, discover_files, find_project_root};
pub use error::{Result, TopologyError};
pub use loader::{load_project, load_project_from_root};
pub use model::{Settings, Topology};
pub use parser::{parse_kdl_file, parse_kdl_string};

/// Topology written by `sky init`: a three-node cluster in one public subnet
pub const SAMPLE_TOPOLOGY: &str = include_str!("../templates/skyflow.kdl");
