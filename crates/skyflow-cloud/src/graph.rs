//! Resource dependency graph
//!
//! Nodes wrap declarations in declaration order. An edge `A -> B` means A's
//! properties reference B's outputs. The topological order is computed once at
//! build time with Kahn's algorithm, breaking ties by declaration order so
//! identical inputs always produce the same order.

use crate::declaration::{Reference, ResourceDeclaration};
use crate::error::GraphError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Lifecycle of a node during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Applying,
    Applied,
    Failed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Applying => write!(f, "applying"),
            NodeStatus::Applied => write!(f, "applied"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// `from` depends on `to` through the output field `field`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    pub field: String,
}

/// A declaration plus its reconciliation state
#[derive(Debug, Clone)]
pub struct ResourceNode {
    declaration: ResourceDeclaration,
    status: NodeStatus,
    dependencies: Vec<usize>,
    id: Option<String>,
    outputs: Map<String, Value>,
}

impl ResourceNode {
    fn new(declaration: ResourceDeclaration, dependencies: Vec<usize>) -> Self {
        Self {
            declaration,
            status: NodeStatus::Pending,
            dependencies,
            id: None,
            outputs: Map::new(),
        }
    }

    pub fn declaration(&self) -> &ResourceDeclaration {
        &self.declaration
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn kind(&self) -> &str {
        &self.declaration.kind
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Provider-assigned identifier, once applied
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn outputs(&self) -> &Map<String, Value> {
        &self.outputs
    }

    /// Output field of an applied node
    pub fn output(&self, field: &str) -> Option<&Value> {
        if self.status != NodeStatus::Applied {
            return None;
        }
        self.outputs.get(field)
    }

    pub(crate) fn dependencies(&self) -> &[usize] {
        &self.dependencies
    }

    pub(crate) fn mark_applying(&mut self) {
        self.status = NodeStatus::Applying;
    }

    pub(crate) fn mark_applied(&mut self, id: String, outputs: Map<String, Value>) {
        self.status = NodeStatus::Applied;
        self.id = Some(id);
        self.outputs = outputs;
    }

    pub(crate) fn mark_failed(&mut self) {
        self.status = NodeStatus::Failed;
    }

    fn reset(&mut self) {
        self.status = NodeStatus::Pending;
        self.id = None;
        self.outputs.clear();
    }
}

/// Directed acyclic graph of declared resources
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<ResourceNode>,
    index: HashMap<String, usize>,
    edges: Vec<DependencyEdge>,
    order: Vec<usize>,
}

impl Graph {
    /// Build the graph, rejecting duplicate names, unknown references and cycles
    pub fn build(declarations: Vec<ResourceDeclaration>) -> Result<Self, GraphError> {
        let mut index = HashMap::with_capacity(declarations.len());
        for (i, decl) in declarations.iter().enumerate() {
            if index.insert(decl.name.clone(), i).is_some() {
                return Err(GraphError::DuplicateName(decl.name.clone()));
            }
        }

        let mut edges: Vec<DependencyEdge> = Vec::new();
        let mut nodes = Vec::with_capacity(declarations.len());
        for decl in declarations {
            let mut dependencies = BTreeSet::new();
            for reference in decl.references() {
                let target = *index.get(&reference.node).ok_or_else(|| {
                    GraphError::UnknownReference {
                        node: decl.name.clone(),
                        reference: reference.clone(),
                    }
                })?;
                dependencies.insert(target);

                let edge = DependencyEdge {
                    from: decl.name.clone(),
                    to: reference.node.clone(),
                    field: reference.field.clone(),
                };
                if !edges.contains(&edge) {
                    edges.push(edge);
                }
            }
            nodes.push(ResourceNode::new(decl, dependencies.into_iter().collect()));
        }

        let order = topological_sort(&nodes)?;
        tracing::debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            "Built resource graph"
        );

        Ok(Self {
            nodes,
            index,
            edges,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node by logical name
    pub fn node(&self, name: &str) -> Option<&ResourceNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Logical names in topological order (dependencies first)
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].name()).collect()
    }

    /// Direct dependencies of a node, in declaration order
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| {
                self.nodes[i]
                    .dependencies
                    .iter()
                    .map(|&d| self.nodes[d].name())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of nodes that reached `applied`, in topological order
    pub fn applied_nodes(&self) -> Vec<String> {
        self.order
            .iter()
            .map(|&i| &self.nodes[i])
            .filter(|n| n.status == NodeStatus::Applied)
            .map(|n| n.name().to_string())
            .collect()
    }

    pub fn is_fully_applied(&self) -> bool {
        self.nodes.iter().all(|n| n.status == NodeStatus::Applied)
    }

    /// Check that every reference in `references` names a declared resource
    pub fn check_references<'a>(
        &self,
        owner: &str,
        references: impl IntoIterator<Item = &'a Reference>,
    ) -> Result<(), GraphError> {
        for reference in references {
            if !self.index.contains_key(&reference.node) {
                return Err(GraphError::UnknownReference {
                    node: owner.to_string(),
                    reference: reference.clone(),
                });
            }
        }
        Ok(())
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn node_at(&self, idx: usize) -> &ResourceNode {
        &self.nodes[idx]
    }

    pub(crate) fn node_at_mut(&mut self, idx: usize) -> &mut ResourceNode {
        &mut self.nodes[idx]
    }

    /// Reverse adjacency: for each node, the nodes that depend on it
    pub(crate) fn dependents(&self) -> Vec<Vec<usize>> {
        dependents_of(&self.nodes)
    }

    /// Position of each node within the topological order
    pub(crate) fn positions(&self) -> Vec<usize> {
        let mut positions = vec![0; self.nodes.len()];
        for (pos, &idx) in self.order.iter().enumerate() {
            positions[idx] = pos;
        }
        positions
    }

    /// Return every node to `pending`, dropping outputs from a previous run
    pub(crate) fn reset(&mut self) {
        for node in &mut self.nodes {
            node.reset();
        }
    }
}

fn dependents_of(nodes: &[ResourceNode]) -> Vec<Vec<usize>> {
    let mut dependents = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for &dep in &node.dependencies {
            dependents[dep].push(i);
        }
    }
    dependents
}

fn topological_sort(nodes: &[ResourceNode]) -> Result<Vec<usize>, GraphError> {
    let dependents = dependents_of(nodes);
    let mut remaining: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != nodes.len() {
        return Err(GraphError::Cycle {
            path: find_cycle(nodes, &remaining),
        });
    }
    Ok(order)
}

/// Walk unsorted nodes along unsatisfied dependencies until one repeats.
///
/// Every unsorted node has at least one unsorted dependency, so the walk
/// always closes a cycle.
fn find_cycle(nodes: &[ResourceNode], remaining: &[usize]) -> Vec<String> {
    let Some(start) = remaining.iter().position(|&r| r > 0) else {
        return Vec::new();
    };

    let mut seen: HashMap<usize, usize> = HashMap::new();
    let mut walk: Vec<usize> = Vec::new();
    let mut current = start;

    loop {
        if let Some(&pos) = seen.get(&current) {
            let mut cycle: Vec<String> = walk[pos..]
                .iter()
                .map(|&i| nodes[i].name().to_string())
                .collect();
            cycle.push(nodes[current].name().to_string());
            return cycle;
        }
        seen.insert(current, walk.len());
        walk.push(current);

        match nodes[current]
            .dependencies
            .iter()
            .copied()
            .find(|&d| remaining[d] > 0)
        {
            Some(next) => current = next,
            None => return walk.iter().map(|&i| nodes[i].name().to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declaration::PropertyValue;

    fn decl(name: &str, refs: &[&str]) -> ResourceDeclaration {
        let mut d = ResourceDeclaration::new("test:Resource", name);
        for (i, target) in refs.iter().enumerate() {
            d.set(format!("ref{i}"), PropertyValue::reference(*target, "id"));
        }
        d
    }

    fn position(order: &[&str], name: &str) -> usize {
        order.iter().position(|n| *n == name).unwrap()
    }

    /// The cluster topology without the key pair
    fn cluster() -> Vec<ResourceDeclaration> {
        vec![
            decl("my-vpc", &[]),
            decl("public-subnet", &["my-vpc"]),
            decl("igw", &["my-vpc"]),
            decl("route-table", &["my-vpc", "igw"]),
            decl("rt-assoc-public", &["public-subnet", "route-table"]),
            decl("web-secgrp", &["my-vpc"]),
            decl("master-node", &["public-subnet", "web-secgrp"]),
            decl("worker-node-1", &["public-subnet", "web-secgrp"]),
            decl("worker-node-2", &["public-subnet", "web-secgrp"]),
        ]
    }

    #[test]
    fn test_cluster_topological_order() {
        let graph = Graph::build(cluster()).unwrap();
        let order = graph.topological_order();

        for dependent in ["public-subnet", "igw", "web-secgrp"] {
            assert!(position(&order, "my-vpc") < position(&order, dependent));
        }
        assert!(position(&order, "route-table") < position(&order, "rt-assoc-public"));
        for instance in ["master-node", "worker-node-1", "worker-node-2"] {
            assert!(position(&order, "public-subnet") < position(&order, instance));
            assert!(position(&order, "web-secgrp") < position(&order, instance));
        }
        assert!(graph.dependencies_of("master-node").len() == 2);
        assert!(graph.dependencies_of("worker-node-1").iter().all(|d| !d.starts_with("master")));
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let graph = Graph::build(cluster()).unwrap();
        assert_eq!(
            graph.topological_order(),
            vec![
                "my-vpc",
                "public-subnet",
                "igw",
                "route-table",
                "rt-assoc-public",
                "web-secgrp",
                "master-node",
                "worker-node-1",
                "worker-node-2",
            ]
        );
    }

    #[test]
    fn test_order_is_independent_of_declaration_order() {
        let mut reversed = cluster();
        reversed.reverse();
        let graph = Graph::build(reversed).unwrap();
        let order = graph.topological_order();

        assert_eq!(order.len(), 9);
        for node in graph.nodes() {
            for dep in graph.dependencies_of(node.name()) {
                assert!(position(&order, dep) < position(&order, node.name()));
            }
        }
    }

    #[test]
    fn test_edges_are_recorded_once() {
        let d = decl("a", &[])
            .with("x", PropertyValue::reference("b", "id"))
            .with("y", PropertyValue::reference("b", "id"));
        let graph = Graph::build(vec![d, decl("b", &[])]).unwrap();

        assert_eq!(
            graph.edges(),
            &[DependencyEdge {
                from: "a".to_string(),
                to: "b".to_string(),
                field: "id".to_string(),
            }]
        );
        assert_eq!(graph.topological_order(), vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_reference() {
        let err = Graph::build(vec![decl("subnet", &["missing-vpc"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownReference {
                node: "subnet".to_string(),
                reference: Reference::new("missing-vpc", "id"),
            }
        );
    }

    #[test]
    fn test_duplicate_name() {
        let err = Graph::build(vec![decl("vpc", &[]), decl("vpc", &[])]).unwrap_err();
        assert_eq!(err, GraphError::DuplicateName("vpc".to_string()));
    }

    #[test]
    fn test_cycle_detection() {
        let err = Graph::build(vec![
            decl("root", &[]),
            decl("a", &["root", "c"]),
            decl("b", &["a"]),
            decl("c", &["b"]),
        ])
        .unwrap_err();

        let GraphError::Cycle { path } = err else {
            panic!("expected cycle, got {err:?}");
        };
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 4);
        for name in ["a", "b", "c"] {
            assert!(path.contains(&name.to_string()));
        }
        assert!(!path.contains(&"root".to_string()));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = Graph::build(vec![decl("loop", &["loop"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                path: vec!["loop".to_string(), "loop".to_string()],
            }
        );
    }

    #[test]
    fn test_new_graph_is_pending() {
        let graph = Graph::build(cluster()).unwrap();
        assert!(graph.nodes().all(|n| n.status() == NodeStatus::Pending));
        assert!(graph.applied_nodes().is_empty());
        assert!(!graph.is_fully_applied());
        assert!(graph.node("igw").unwrap().output("id").is_none());
    }
}
