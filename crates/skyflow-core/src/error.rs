use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {path}\nreason: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("file discovery error: {path}\nreason: {message}")]
    DiscoveryError { path: PathBuf, message: String },

    #[error(
        "project root not found\nsearched from: {0}\nhint: run inside a directory containing skyflow.kdl, or run `sky init`"
    )]
    ProjectRootNotFound(PathBuf),

    #[error("invalid reference '{reference}' in {context}: expected \"node.field\"")]
    InvalidReference { context: String, reference: String },

    #[error("{context} refers to undeclared resource '{node}'")]
    UnknownResource { context: String, node: String },
}

pub type Result<T> = std::result::Result<T, TopologyError>;
