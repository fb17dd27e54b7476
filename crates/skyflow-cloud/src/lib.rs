//! Skyflow engine
//!
//! Builds a dependency graph from resource declarations, reconciles it
//! against a provider in dependency order and collects the exported outputs,
//! including locally generated key material.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                    sky CLI                       │
//! │            (sky apply / preview / destroy)       │
//! └─────────────────┬───────────────────────────────┘
//!                   │ declarations, exports, secrets
//! ┌─────────────────▼───────────────────────────────┐
//! │                 skyflow-cloud                    │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │    Graph     │─▶│       Reconciler         │ │
//! │  └──────────────┘  │  trait ProviderClient    │ │
//! │  ┌──────────────┐  └────────────┬─────────────┘ │
//! │  │   Secrets    │  ┌────────────▼─────────────┐ │
//! │  │ KeyGenerator │  │  State Mgmt  │  Outputs  │ │
//! │  │ SecretStore  │  └──────────────────────────┘ │
//! │  └──────────────┘                               │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod action;
pub mod declaration;
pub mod error;
pub mod graph;
pub mod output;
pub mod provider;
pub mod reconcile;
pub mod secret;
pub mod simulate;
pub mod state;

// Re-exports
pub use action::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use declaration::{PropertyValue, Reference, ResourceDeclaration};
pub use error::{CloudError, GraphError, KeyGenError, OutputError, ReconcileError, Result};
pub use graph::{DependencyEdge, Graph, NodeStatus, ResourceNode};
pub use output::{Export, ExportSource, OutputSet, OutputValue, finalize_outputs};
pub use provider::{ProviderClient, UpsertRequest, UpsertResponse};
pub use reconcile::{ApplyMode, Reconciler, Reconciliation, recorded_outputs};
pub use secret::{
    FileSecretStore, KeyGenerator, KeyPair, SecretBinding, SecretStore, SshKeygen,
    ensure_key_pair, generate_key_pair, inject_secret, verify_no_leak,
};
pub use simulate::{ProviderCall, SimulatedProvider};
pub use state::{GlobalState, ResourceState, StateLock, StateManager};
