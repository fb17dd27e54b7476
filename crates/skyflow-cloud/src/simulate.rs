//! In-memory provider
//!
//! Behaves like a well-mannered cloud API: assigns ids, reports outputs,
//! treats repeated upserts as update-or-noop and can be told to fail or to
//! respond slowly. Used by `sky` until a real provider is configured, and by
//! the test suites.

use crate::action::ActionType;
use crate::error::{CloudError, Result};
use crate::provider::{ProviderClient, UpsertRequest, UpsertResponse};
use crate::state::GlobalState;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One recorded provider call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    /// `action` is `None` when the call failed
    Upsert {
        name: String,
        action: Option<ActionType>,
    },
    Delete {
        id: String,
    },
}

#[derive(Debug, Clone)]
struct SimulatedResource {
    id: String,
    kind: String,
    properties: Value,
    outputs: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    next_host: u32,
    resources: HashMap<String, SimulatedResource>,
    calls: Vec<ProviderCall>,
    created: usize,
    updated: usize,
    deleted: usize,
}

/// In-memory provider client
#[derive(Debug, Default)]
pub struct SimulatedProvider {
    inner: Mutex<Inner>,
    failures: HashSet<String>,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the provider with resources recorded by a previous run
    pub fn from_state(state: &GlobalState) -> Self {
        let provider = Self::new();
        {
            let mut inner = provider.lock();
            for (key, resource) in &state.resources {
                inner.resources.insert(
                    key.clone(),
                    SimulatedResource {
                        id: resource.id.clone(),
                        kind: resource.resource_type.clone(),
                        properties: resource.properties.clone(),
                        outputs: resource.attributes.clone(),
                    },
                );
            }
            // Continue after the highest id and address in use
            inner.next_id = state
                .resources
                .values()
                .filter_map(|r| id_counter(&r.id))
                .max()
                .unwrap_or(0);
            inner.next_host = state
                .resources
                .values()
                .filter_map(|r| r.get_attribute::<String>("public_ip"))
                .filter_map(|ip| host_slot(&ip))
                .map(|slot| slot + 1)
                .max()
                .unwrap_or(0);
        }
        provider
    }

    /// Fail every upsert of the named resource
    pub fn with_failure(mut self, name: impl Into<String>) -> Self {
        self.failures.insert(name.into());
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call received so far, in arrival order
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Names passed to `upsert`, in arrival order
    pub fn upserted_names(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::Upsert { name, .. } => Some(name.clone()),
                ProviderCall::Delete { .. } => None,
            })
            .collect()
    }

    pub fn created_count(&self) -> usize {
        self.lock().created
    }

    pub fn updated_count(&self) -> usize {
        self.lock().updated
    }

    pub fn deleted_count(&self) -> usize {
        self.lock().deleted
    }

    /// Number of resources currently held
    pub fn resource_count(&self) -> usize {
        self.lock().resources.len()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn upsert_now(&self, request: &UpsertRequest) -> Result<UpsertResponse> {
        let mut inner = self.lock();

        if self.failures.contains(&request.name) {
            inner.calls.push(ProviderCall::Upsert {
                name: request.name.clone(),
                action: None,
            });
            return Err(CloudError::ApiError(format!(
                "simulated failure creating {}",
                request.key()
            )));
        }

        let Value::Object(properties) = &request.properties else {
            return Err(CloudError::InvalidConfig(format!(
                "properties of {} must be an object",
                request.key()
            )));
        };

        let key = request.key();
        let response = match inner.resources.get(&key).cloned() {
            Some(existing) if existing.properties == request.properties => {
                UpsertResponse::unchanged(existing.id, existing.outputs)
            }
            Some(existing) => {
                let mut outputs = properties.clone();
                for (field, value) in &existing.outputs {
                    if !properties.contains_key(field) {
                        outputs.insert(field.clone(), value.clone());
                    }
                }
                inner.resources.insert(
                    key,
                    SimulatedResource {
                        properties: request.properties.clone(),
                        outputs: outputs.clone(),
                        ..existing.clone()
                    },
                );
                inner.updated += 1;
                UpsertResponse::updated(existing.id, outputs)
            }
            None => {
                inner.next_id += 1;
                let id = format!("{}-{:08x}", id_prefix(&request.kind), inner.next_id);
                let mut outputs = properties.clone();
                outputs.insert("id".to_string(), json!(id));
                outputs.insert(
                    "arn".to_string(),
                    json!(format!("arn:sim:{}:{}", request.kind, id)),
                );
                if is_instance(&request.kind) {
                    let host = inner.next_host % 250 + 4;
                    inner.next_host += 1;
                    outputs.insert("public_ip".to_string(), json!(format!("203.0.113.{host}")));
                    outputs.insert("private_ip".to_string(), json!(format!("10.0.1.{host}")));
                }
                if is_key_pair(&request.kind) && !outputs.contains_key("key_name") {
                    outputs.insert("key_name".to_string(), json!(request.name));
                }
                inner.resources.insert(
                    key,
                    SimulatedResource {
                        id: id.clone(),
                        kind: request.kind.clone(),
                        properties: request.properties.clone(),
                        outputs: outputs.clone(),
                    },
                );
                inner.created += 1;
                UpsertResponse::created(id, outputs)
            }
        };

        inner.calls.push(ProviderCall::Upsert {
            name: request.name.clone(),
            action: Some(response.action),
        });
        Ok(response)
    }
}

#[async_trait]
impl ProviderClient for SimulatedProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn upsert(&self, request: &UpsertRequest) -> Result<UpsertResponse> {
        self.simulate_latency().await;
        self.upsert_now(request)
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<()> {
        self.simulate_latency().await;

        let mut inner = self.lock();
        inner.calls.push(ProviderCall::Delete { id: id.to_string() });

        let key = inner
            .resources
            .iter()
            .find(|(_, r)| r.id == id && r.kind == kind)
            .map(|(k, _)| k.clone())
            .ok_or_else(|| CloudError::ResourceNotFound(format!("{} {}", kind, id)))?;
        inner.resources.remove(&key);
        inner.deleted += 1;
        Ok(())
    }
}

/// Last segment of a kind such as "aws:ec2/RouteTable"
fn kind_suffix(kind: &str) -> &str {
    kind.rsplit(['/', ':']).next().unwrap_or(kind)
}

fn is_instance(kind: &str) -> bool {
    kind_suffix(kind).eq_ignore_ascii_case("instance")
}

fn is_key_pair(kind: &str) -> bool {
    kind_suffix(kind).eq_ignore_ascii_case("keypair")
}

/// Counter encoded in a simulated id: "i-0000000a" -> 10
fn id_counter(id: &str) -> Option<u64> {
    let (_, hex) = id.rsplit_once('-')?;
    u64::from_str_radix(hex, 16).ok()
}

/// Host slot of a simulated public address: "203.0.113.7" -> 3
fn host_slot(ip: &str) -> Option<u32> {
    let host: u32 = ip.strip_prefix("203.0.113.")?.parse().ok()?;
    host.checked_sub(4)
}

fn id_prefix(kind: &str) -> String {
    match kind_suffix(kind) {
        "Vpc" => "vpc".to_string(),
        "Subnet" => "subnet".to_string(),
        "InternetGateway" => "igw".to_string(),
        "RouteTable" => "rtb".to_string(),
        "RouteTableAssociation" => "rtbassoc".to_string(),
        "SecurityGroup" => "sg".to_string(),
        "Instance" => "i".to_string(),
        "KeyPair" => "key".to_string(),
        other => other.to_ascii_lowercase(),
    }
}
