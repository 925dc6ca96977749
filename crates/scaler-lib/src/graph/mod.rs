//! Service mesh dependency graph
//!
//! A [`WorkloadGraph`] is a snapshot of the mesh as reported by the telemetry
//! backend: workload nodes keyed by graph-local id, each with its outgoing
//! traffic edges. It is rebuilt on every fetch and never cached.
//!
//! Edge metrics arrive as strings. Anything that fails to parse contributes
//! zero instead of failing the computation.

mod kiali;
mod snapshot;

pub use kiali::{KialiClient, GRAPH_ENDPOINT};
pub use snapshot::{CytoscapeEdge, CytoscapeNode, EdgeWrapper, Elements, GraphSnapshot, NodeWrapper};

use crate::error::{ScalerError, ScalerResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Workload name the telemetry backend gives to traffic from outside the mesh
pub const UNKNOWN_WORKLOAD: &str = "unknown";

/// Source of workload graphs
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Fetch the current workload graph for the given namespaces
    async fn fetch_workload_graph(
        &self,
        namespaces: &[String],
        params: &GraphParams,
    ) -> Result<WorkloadGraph>;
}

/// Query parameters for a graph fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphParams {
    /// Response time statistic reported on edges (e.g. "avg")
    pub response_time: String,
    /// Throughput flavour reported on edges (e.g. "response")
    pub throughput: String,
    /// Observation window (e.g. "1m", "5m")
    pub duration: String,
}

impl GraphParams {
    pub fn with_duration(duration: impl Into<String>) -> Self {
        Self {
            duration: duration.into(),
            ..Self::default()
        }
    }

    /// Query pairs in the form the telemetry backend expects
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("responseTime", self.response_time.as_str()),
            ("throughput", self.throughput.as_str()),
            ("duration", self.duration.as_str()),
        ]
    }
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            response_time: "avg".to_string(),
            throughput: "response".to_string(),
            duration: "5m".to_string(),
        }
    }
}

/// Traffic rates of an edge, keyed by protocol
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Traffic {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub rates: HashMap<String, String>,
}

/// Directed traffic edge to another node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Id of the target node
    pub target: String,
    /// Observed throughput, as reported
    pub throughput: String,
    /// Observed average response time, as reported
    pub response_time: String,
    pub traffic: Option<Traffic>,
}

impl Edge {
    pub fn new(
        target: impl Into<String>,
        throughput: impl Into<String>,
        response_time: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            throughput: throughput.into(),
            response_time: response_time.into(),
            traffic: None,
        }
    }

    pub fn with_traffic(mut self, traffic: Traffic) -> Self {
        self.traffic = Some(traffic);
        self
    }

    /// Throughput as a float, zero if unparsable
    pub fn throughput(&self) -> f64 {
        parse_or_zero(&self.throughput)
    }

    /// Throughput as a whole number, zero if not an integer
    pub fn whole_throughput(&self) -> i64 {
        self.throughput.trim().parse().unwrap_or(0)
    }

    /// Response time as a float, zero if unparsable
    pub fn response_time(&self) -> f64 {
        parse_or_zero(&self.response_time)
    }

    /// In-flight work carried by this edge
    pub fn queue_length(&self) -> f64 {
        self.throughput() * self.response_time()
    }

    /// Traffic rate for a protocol, zero if absent or unparsable
    pub fn rate(&self, protocol: &str) -> f64 {
        self.traffic
            .as_ref()
            .and_then(|t| t.rates.get(protocol))
            .map(|r| parse_or_zero(r))
            .unwrap_or(0.0)
    }
}

fn parse_or_zero(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// A workload and its outgoing edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadNode {
    pub id: String,
    pub workload: String,
    pub edges: Vec<Edge>,
}

impl WorkloadNode {
    pub fn new(id: impl Into<String>, workload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workload: workload.into(),
            edges: Vec::new(),
        }
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.workload == UNKNOWN_WORKLOAD
    }
}

/// Per-workload queue lengths of one graph snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueLengths {
    /// Keyed by target workload name, "unknown" excluded
    pub per_workload: BTreeMap<String, f64>,
    /// Aggregate of edges targeting the unknown node
    pub unknown: f64,
}

impl QueueLengths {
    pub fn get(&self, workload: &str) -> f64 {
        self.per_workload.get(workload).copied().unwrap_or(0.0)
    }
}

/// Mesh snapshot: nodes by id plus a workload-name index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkloadGraph {
    nodes: BTreeMap<String, WorkloadNode>,
    ids_by_workload: HashMap<String, String>,
}

impl WorkloadGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a list of nodes.
    ///
    /// If several nodes share a workload name, the name index points at the
    /// one inserted last.
    pub fn from_nodes(nodes: impl IntoIterator<Item = WorkloadNode>) -> Self {
        let mut graph = Self::new();
        for node in nodes {
            graph.insert(node);
        }
        graph
    }

    pub fn insert(&mut self, node: WorkloadNode) {
        self.ids_by_workload
            .insert(node.workload.clone(), node.id.clone());
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, id: &str) -> Option<&WorkloadNode> {
        self.nodes.get(id)
    }

    pub fn node_by_workload(&self, workload: &str) -> Option<&WorkloadNode> {
        self.ids_by_workload
            .get(workload)
            .and_then(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &WorkloadNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of every workload in the graph except the unknown node, sorted
    pub fn workloads(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .values()
            .filter(|n| !n.is_unknown())
            .map(|n| n.workload.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Workload name behind a node id, if the node exists
    pub fn workload_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.workload.as_str())
    }

    /// Sum of `throughput x response time` over all edges, grouped by the
    /// target workload.
    pub fn queue_lengths(&self) -> QueueLengths {
        let mut lengths = QueueLengths::default();

        for node in self.nodes.values() {
            for edge in &node.edges {
                let Some(target) = self.workload_of(&edge.target) else {
                    debug!(
                        source = %node.workload,
                        target_id = %edge.target,
                        "Skipping edge to node missing from graph"
                    );
                    continue;
                };

                let queue_length = edge.queue_length();
                if target == UNKNOWN_WORKLOAD {
                    lengths.unknown += queue_length;
                } else {
                    *lengths.per_workload.entry(target.to_string()).or_insert(0.0) +=
                        queue_length;
                }
            }
        }

        lengths
    }

    fn ingress(&self) -> ScalerResult<&WorkloadNode> {
        self.node_by_workload(UNKNOWN_WORKLOAD)
            .ok_or(ScalerError::NoIngressNode)
    }

    /// End-to-end throughput: integer throughput summed over the unknown
    /// node's outgoing edges
    pub fn end_to_end_throughput(&self) -> ScalerResult<i64> {
        Ok(self
            .ingress()?
            .edges
            .iter()
            .map(Edge::whole_throughput)
            .sum())
    }

    /// HTTP request rate entering the mesh
    pub fn ingress_request_rate(&self) -> ScalerResult<f64> {
        Ok(self.ingress()?.edges.iter().map(|e| e.rate("http")).sum())
    }
}
