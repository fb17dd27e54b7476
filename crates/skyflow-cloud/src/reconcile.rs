//! Dependency-ordered reconciliation
//!
//! A single task drives the run. Ready nodes (all dependencies applied) are
//! started in topological order, up to the concurrency allowed by the
//! [`ApplyMode`]; their provider calls are polled together through a
//! `FuturesUnordered`. On the first provider failure, or on cancellation, no
//! further nodes are started, but calls already in flight are awaited so that
//! no remote resource is created without being recorded. Nothing is rolled
//! back.

use crate::action::{Action, ActionType, ApplyResult, Plan};
use crate::declaration::Reference;
use crate::error::{OutputError, ReconcileError};
use crate::graph::{Graph, NodeStatus};
use crate::output::{Export, OutputSet, finalize_outputs};
use crate::provider::{ProviderClient, UpsertRequest};
use crate::state::{GlobalState, ResourceState};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashSet};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How independent nodes are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    /// One provider call at a time, in topological order
    #[default]
    Sequential,
    /// Up to `max_concurrency` independent nodes in flight at once
    Parallel { max_concurrency: usize },
}

impl ApplyMode {
    fn concurrency(&self) -> usize {
        match self {
            ApplyMode::Sequential => 1,
            ApplyMode::Parallel { max_concurrency } => (*max_concurrency).max(1),
        }
    }
}

/// Outcome of a successful `apply`
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub outputs: OutputSet,
    pub result: ApplyResult,
}

/// Ready-set bookkeeping for one run
struct Schedule {
    waiting: Vec<usize>,
    dependents: Vec<Vec<usize>>,
    positions: Vec<usize>,
    ready: BTreeSet<(usize, usize)>,
}

impl Schedule {
    fn new(graph: &Graph) -> Self {
        let positions = graph.positions();
        let waiting: Vec<usize> = graph
            .nodes()
            .map(|n| n.dependencies().len())
            .collect();
        let ready = waiting
            .iter()
            .enumerate()
            .filter(|&(_, &w)| w == 0)
            .map(|(idx, _)| (positions[idx], idx))
            .collect();
        Self {
            waiting,
            dependents: graph.dependents(),
            positions,
            ready,
        }
    }

    /// Next ready node, earliest in topological order
    fn next_ready(&mut self) -> Option<usize> {
        self.ready.pop_first().map(|(_, idx)| idx)
    }

    /// Mark a node applied, releasing dependents whose dependencies are all applied
    fn complete(&mut self, idx: usize) {
        for &dependent in &self.dependents[idx] {
            self.waiting[dependent] -= 1;
            if self.waiting[dependent] == 0 {
                self.ready.insert((self.positions[dependent], dependent));
            }
        }
    }
}

/// Resolve a node's properties from the outputs of applied nodes
fn resolve_properties(graph: &Graph, idx: usize) -> Result<Value, Reference> {
    graph.node_at(idx).declaration().resolve(&|r: &Reference| {
        graph
            .node(&r.node)
            .filter(|n| n.status() == NodeStatus::Applied)
            .and_then(|n| n.output(&r.field))
            .cloned()
    })
}

/// Drives a graph to its declared state through a provider client
pub struct Reconciler<'a> {
    client: &'a dyn ProviderClient,
    mode: ApplyMode,
    cancel: CancellationToken,
}

impl<'a> Reconciler<'a> {
    pub fn new(client: &'a dyn ProviderClient) -> Self {
        Self {
            client,
            mode: ApplyMode::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: ApplyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Stop starting new nodes once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Compute what `apply` would do, without calling the provider.
    ///
    /// A node is an update when its literal properties differ from the
    /// recorded ones or when anything it depends on changes.
    pub fn plan(&self, graph: &Graph, state: &GlobalState) -> Plan {
        let mut changing = vec![false; graph.len()];
        let mut actions = Vec::with_capacity(graph.len());
        let declared = declared_keys(graph);

        for &idx in graph.order_indices() {
            let node = graph.node_at(idx);
            let key = GlobalState::key(node.kind(), node.name());
            let upstream_changing = node.dependencies().iter().any(|&d| changing[d]);

            let action = match state.get_resource(&key) {
                None => Action::new(ActionType::Create, node.kind(), node.name()),
                Some(recorded) => {
                    let action_type = if upstream_changing
                        || !node.declaration().matches_recorded(&recorded.properties)
                    {
                        ActionType::Update
                    } else {
                        ActionType::NoOp
                    };
                    Action::new(action_type, node.kind(), node.name())
                        .with_detail("id", json!(recorded.id))
                }
            };

            changing[idx] = action.action_type != ActionType::NoOp;
            actions.push(action.with_detail("properties", node.declaration().symbolic_properties()));
        }

        for (key, recorded) in orphans(&declared, state) {
            actions.push(
                Action::new(ActionType::Delete, &recorded.resource_type, logical_name(key))
                    .with_detail("id", json!(recorded.id)),
            );
        }

        Plan::new(actions)
    }

    /// Compute what `destroy` would do: declared resources dependents first,
    /// then recorded resources no longer declared, newest first
    pub fn plan_destroy(&self, graph: &Graph, state: &GlobalState) -> Plan {
        let mut actions: Vec<Action> = graph
            .order_indices()
            .iter()
            .rev()
            .map(|&idx| graph.node_at(idx))
            .filter_map(|node| {
                state
                    .get_resource(&GlobalState::key(node.kind(), node.name()))
                    .map(|recorded| {
                        Action::new(ActionType::Delete, node.kind(), node.name())
                            .with_detail("id", json!(recorded.id))
                    })
            })
            .collect();

        for (key, recorded) in orphans(&declared_keys(graph), state) {
            actions.push(
                Action::new(ActionType::Delete, &recorded.resource_type, logical_name(key))
                    .with_detail("id", json!(recorded.id)),
            );
        }
        Plan::new(actions)
    }

    /// Apply every node in dependency order and collect the exports.
    ///
    /// `state` is updated as each node is applied, including on failure, so
    /// the caller should persist it whatever the outcome.
    pub async fn apply(
        &self,
        graph: &mut Graph,
        exports: &[Export],
        state: &mut GlobalState,
    ) -> Result<Reconciliation, ReconcileError> {
        let start = Instant::now();
        let limit = self.mode.concurrency();
        let mut result = ApplyResult::new();
        let mut schedule = Schedule::new(graph);
        let mut in_flight = FuturesUnordered::new();
        let mut failure: Option<ReconcileError> = None;
        let mut cancelled = false;

        graph.reset();
        info!(
            provider = self.client.name(),
            resources = graph.len(),
            concurrency = limit,
            "Starting reconciliation"
        );

        loop {
            while failure.is_none() && !cancelled && in_flight.len() < limit {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                let Some(idx) = schedule.next_ready() else {
                    break;
                };

                let node = graph.node_at(idx);
                let name = node.name().to_string();
                let kind = node.kind().to_string();
                let properties = match resolve_properties(graph, idx) {
                    Ok(properties) => properties,
                    Err(reference) => {
                        error!(resource = %name, %reference, "Unresolved reference");
                        graph.node_at_mut(idx).mark_failed();
                        failure = Some(ReconcileError::UnresolvedReference {
                            node: name,
                            reference,
                        });
                        break;
                    }
                };

                let key = GlobalState::key(&kind, &name);
                let recorded = state.get_resource(&key);
                if let Some(recorded) = recorded
                    && recorded.status == NodeStatus::Applied
                    && recorded.properties == properties
                {
                    debug!(resource = %name, id = %recorded.id, "Unchanged, skipping provider call");
                    let id = recorded.id.clone();
                    let outputs = recorded.attributes.clone();
                    graph.node_at_mut(idx).mark_applied(id.clone(), outputs);
                    result.add_success(
                        format!("{}-{}", ActionType::NoOp, name),
                        ActionType::NoOp,
                        format!("{} is up to date ({})", name, id),
                    );
                    schedule.complete(idx);
                    continue;
                }

                let request = UpsertRequest::new(kind, name, properties)
                    .with_existing_id(recorded.map(|r| r.id.clone()));
                info!(resource = %request.name, kind = %request.kind, "Applying");
                graph.node_at_mut(idx).mark_applying();

                let client = self.client;
                in_flight.push(async move {
                    let response = client.upsert(&request).await;
                    (idx, request, response)
                });
            }

            if in_flight.is_empty() {
                break;
            }

            let next = if cancelled || failure.is_some() {
                in_flight.next().await
            } else {
                let pending = in_flight.len();
                tokio::select! {
                    next = in_flight.next() => next,
                    () = self.cancel.cancelled() => {
                        warn!(
                            in_flight = pending,
                            "Cancellation requested; waiting for in-flight resources"
                        );
                        cancelled = true;
                        continue;
                    }
                }
            };
            let Some((idx, request, response)) = next else {
                break;
            };

            match response {
                Ok(response) => {
                    if let Some(previous) = &request.existing_id
                        && *previous != response.id
                    {
                        warn!(
                            resource = %request.name,
                            previous = %previous,
                            current = %response.id,
                            "Provider replaced resource"
                        );
                    }

                    let key = request.key();
                    let created_at = state.get_resource(&key).map(|r| r.created_at);
                    let mut record = ResourceState::new(response.id.clone(), request.kind.clone())
                        .with_properties(request.properties)
                        .with_attributes(response.outputs.clone());
                    if let Some(created_at) = created_at {
                        record = record.created_at(created_at);
                    }
                    state.set_resource(key, record);

                    info!(
                        resource = %request.name,
                        id = %response.id,
                        action = %response.action,
                        "Applied"
                    );
                    result.add_success(
                        format!("{}-{}", response.action, request.name),
                        response.action,
                        format!("{} {} ({})", response.action, request.name, response.id),
                    );
                    graph
                        .node_at_mut(idx)
                        .mark_applied(response.id, response.outputs);
                    schedule.complete(idx);
                }
                Err(cause) => {
                    error!(resource = %request.name, error = %cause, "Provider call failed");
                    graph.node_at_mut(idx).mark_failed();
                    let action_type = if request.existing_id.is_some() {
                        ActionType::Update
                    } else {
                        ActionType::Create
                    };
                    result.add_failure(
                        format!("{}-{}", action_type, request.name),
                        action_type,
                        cause.to_string(),
                    );
                    if failure.is_none() {
                        failure = Some(ReconcileError::ProviderFailure {
                            node: request.name,
                            cause,
                        });
                    }
                }
            }
        }

        result.duration_ms = start.elapsed().as_millis() as u64;

        if let Some(failure) = failure {
            return Err(failure);
        }
        if cancelled && !graph.is_fully_applied() {
            return Err(ReconcileError::Cancelled {
                applied_nodes: graph.applied_nodes(),
            });
        }

        self.prune(graph, state, &mut result).await?;
        result.duration_ms = start.elapsed().as_millis() as u64;

        let outputs = finalize_outputs(graph, exports)?;
        info!(
            summary = %result.summary(),
            duration_ms = result.duration_ms,
            "Reconciliation complete"
        );
        Ok(Reconciliation { outputs, result })
    }

    /// Delete recorded resources that are no longer declared, newest first
    async fn prune(
        &self,
        graph: &Graph,
        state: &mut GlobalState,
        result: &mut ApplyResult,
    ) -> Result<(), ReconcileError> {
        let declared = declared_keys(graph);
        let stale: Vec<(String, ResourceState)> = orphans(&declared, state)
            .into_iter()
            .map(|(key, recorded)| (key.to_string(), recorded.clone()))
            .collect();

        for (key, recorded) in stale {
            let name = logical_name(&key).to_string();
            info!(resource = %name, id = %recorded.id, "Deleting resource no longer declared");
            let action_id = format!("{}-{}", ActionType::Delete, name);
            match self.client.delete(&recorded.resource_type, &recorded.id).await {
                Ok(()) => {
                    state.remove_resource(&key);
                    result.add_success(
                        action_id,
                        ActionType::Delete,
                        format!("deleted {} ({})", name, recorded.id),
                    );
                }
                Err(cause) => {
                    error!(resource = %name, error = %cause, "Delete failed");
                    result.add_failure(action_id, ActionType::Delete, cause.to_string());
                    return Err(ReconcileError::ProviderFailure { node: name, cause });
                }
            }
        }
        Ok(())
    }

    /// Delete every recorded resource: those of the graph dependents first,
    /// then the ones no longer declared, newest first.
    ///
    /// Stops at the first failure; resources deleted so far are removed from `state`.
    pub async fn destroy(
        &self,
        graph: &Graph,
        state: &mut GlobalState,
    ) -> Result<ApplyResult, ReconcileError> {
        let start = Instant::now();
        let mut result = ApplyResult::new();

        for &idx in graph.order_indices().iter().rev() {
            let node = graph.node_at(idx);
            let key = GlobalState::key(node.kind(), node.name());
            let Some(recorded) = state.get_resource(&key) else {
                continue;
            };

            if self.cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled {
                    applied_nodes: remaining_recorded(graph, state),
                });
            }

            let id = recorded.id.clone();
            info!(resource = %node.name(), id = %id, "Deleting");
            match self.client.delete(node.kind(), &id).await {
                Ok(()) => {
                    state.remove_resource(&key);
                    result.add_success(
                        format!("{}-{}", ActionType::Delete, node.name()),
                        ActionType::Delete,
                        format!("deleted {} ({})", node.name(), id),
                    );
                }
                Err(cause) => {
                    error!(resource = %node.name(), error = %cause, "Delete failed");
                    result.add_failure(
                        format!("{}-{}", ActionType::Delete, node.name()),
                        ActionType::Delete,
                        cause.to_string(),
                    );
                    return Err(ReconcileError::ProviderFailure {
                        node: node.name().to_string(),
                        cause,
                    });
                }
            }
        }

        // Whatever is still recorded is no longer declared, typically left
        // behind by an apply that failed before pruning
        if !state.is_empty() && self.cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled {
                applied_nodes: state
                    .resources
                    .keys()
                    .map(|key| logical_name(key).to_string())
                    .collect(),
            });
        }
        self.prune(graph, state, &mut result).await?;

        result.duration_ms = start.elapsed().as_millis() as u64;
        Ok(result)
    }
}

/// Outputs of the last apply, read back from `state` without calling the provider.
///
/// Nodes present in `state` are marked applied with their recorded outputs;
/// exports of nodes that were never applied fail with [`OutputError::NotApplied`].
pub fn recorded_outputs(
    graph: &mut Graph,
    exports: &[Export],
    state: &GlobalState,
) -> Result<OutputSet, OutputError> {
    graph.reset();
    for idx in 0..graph.len() {
        let node = graph.node_at(idx);
        if let Some(recorded) = state.get_resource(&GlobalState::key(node.kind(), node.name())) {
            let (id, outputs) = (recorded.id.clone(), recorded.attributes.clone());
            graph.node_at_mut(idx).mark_applied(id, outputs);
        }
    }
    finalize_outputs(graph, exports)
}

fn declared_keys(graph: &Graph) -> HashSet<String> {
    graph
        .nodes()
        .map(|n| GlobalState::key(n.kind(), n.name()))
        .collect()
}

/// Recorded resources missing from `declared`, most recently created first.
///
/// Dependencies are always created before their dependents, so this is a
/// safe deletion order without the original graph.
fn orphans<'s>(
    declared: &HashSet<String>,
    state: &'s GlobalState,
) -> Vec<(&'s str, &'s ResourceState)> {
    let mut stale: Vec<_> = state
        .resources
        .iter()
        .filter(|(key, _)| !declared.contains(*key))
        .map(|(key, recorded)| (key.as_str(), recorded))
        .collect();
    stale.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
    stale
}

/// "aws:ec2/Vpc:my-vpc" -> "my-vpc"
fn logical_name(key: &str) -> &str {
    key.rsplit_once(':').map_or(key, |(_, name)| name)
}

/// Declared resources still present in state, in topological order
fn remaining_recorded(graph: &Graph, state: &GlobalState) -> Vec<String> {
    graph
        .order_indices()
        .iter()
        .map(|&idx| graph.node_at(idx))
        .filter(|n| {
            state
                .get_resource(&GlobalState::key(n.kind(), n.name()))
                .is_some()
        })
        .map(|n| n.name().to_string())
        .collect()
}
