//! Error types for graph building, reconciliation, secrets and outputs

use crate::declaration::Reference;
use thiserror::Error;

/// Provider and state errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

/// Malformed declarations, reported before any provider call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate resource name: {0}")]
    DuplicateName(String),

    #[error("Resource '{node}' references unknown resource '{}' (via {reference})", .reference.node)]
    UnknownReference { node: String, reference: Reference },

    #[error("Dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Local secret generation and injection failures
#[derive(Error, Debug)]
pub enum KeyGenError {
    #[error("Invalid RSA key size: {0} bits (minimum {min})", min = crate::secret::MIN_RSA_BITS)]
    InvalidBits(u32),

    #[error("Key generation tool '{program}' failed: {message}")]
    Tool { program: String, message: String },

    #[error("Incomplete key pair: {0} is missing")]
    Incomplete(String),

    #[error("Stored public key does not match the private key at {0}")]
    Mismatch(String),

    #[error("Secret injection target not found: {0}")]
    UnknownTarget(String),

    #[error("Private key material found in property '{field}' of resource '{node}'")]
    Leak { node: String, field: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output finalization failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    #[error("Cannot export '{export}': resource '{node}' has not been applied")]
    NotApplied { export: String, node: String },

    #[error("Cannot export '{export}': resource '{node}' has no output '{field}'")]
    MissingField {
        export: String,
        node: String,
        field: String,
    },
}

/// Reconciliation failures
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Provider failed on resource '{node}': {cause}")]
    ProviderFailure {
        node: String,
        #[source]
        cause: CloudError,
    },

    #[error("Reconciliation cancelled after applying {} resource(s)", .applied_nodes.len())]
    Cancelled { applied_nodes: Vec<String> },

    #[error("Resource '{node}' references '{reference}', which is not an output of that resource")]
    UnresolvedReference { node: String, reference: Reference },

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl ReconcileError {
    /// Logical name of the resource the error is attributed to, if any
    pub fn node(&self) -> Option<&str> {
        match self {
            ReconcileError::ProviderFailure { node, .. }
            | ReconcileError::UnresolvedReference { node, .. } => Some(node),
            ReconcileError::Output(OutputError::NotApplied { node, .. })
            | ReconcileError::Output(OutputError::MissingField { node, .. }) => Some(node),
            ReconcileError::Cancelled { .. } => None,
        }
    }
}
