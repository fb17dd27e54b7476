//! Provider client trait definition

use crate::action::ActionType;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provider client abstraction
///
/// The reconciler drives every remote change through this trait. Implementations
/// must tolerate concurrent calls, or serialize them internally, because
/// independent resources may be applied in parallel.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Returns the provider name (e.g., "aws", "simulated")
    fn name(&self) -> &str;

    /// Create the resource, or update it in place when it already exists
    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertResponse>;

    /// Delete a resource by provider-assigned id
    async fn delete(&self, kind: &str, id: &str) -> Result<()>;
}

/// A single create-or-update call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertRequest {
    /// Resource kind (e.g., "aws:ec2/Subnet")
    pub kind: String,

    /// Logical resource name
    pub name: String,

    /// Fully resolved input properties
    pub properties: Value,

    /// Identifier recorded by a previous run, if any
    pub existing_id: Option<String>,
}

impl UpsertRequest {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            properties,
            existing_id: None,
        }
    }

    pub fn with_existing_id(mut self, id: Option<String>) -> Self {
        self.existing_id = id;
        self
    }

    /// Get the full resource key (kind:name)
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

/// Result of an upsert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    /// Provider-assigned identifier
    pub id: String,

    /// Output attributes (id, ARN, addresses, ...)
    pub outputs: Map<String, Value>,

    /// What the provider actually did
    pub action: ActionType,
}

impl UpsertResponse {
    pub fn new(id: impl Into<String>, outputs: Map<String, Value>, action: ActionType) -> Self {
        let id = id.into();
        let mut outputs = outputs;
        outputs
            .entry("id")
            .or_insert_with(|| Value::String(id.clone()));
        Self {
            id,
            outputs,
            action,
        }
    }

    pub fn created(id: impl Into<String>, outputs: Map<String, Value>) -> Self {
        Self::new(id, outputs, ActionType::Create)
    }

    pub fn updated(id: impl Into<String>, outputs: Map<String, Value>) -> Self {
        Self::new(id, outputs, ActionType::Update)
    }

    pub fn unchanged(id: impl Into<String>, outputs: Map<String, Value>) -> Self {
        Self::new(id, outputs, ActionType::NoOp)
    }
}
