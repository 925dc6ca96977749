//! Cytoscape graph documents returned by the telemetry backend

use super::{Edge, Traffic, WorkloadGraph, WorkloadNode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level graph document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub duration: i64,
    #[serde(default, rename = "graphType")]
    pub graph_type: String,
    #[serde(default)]
    pub elements: Elements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Elements {
    #[serde(default)]
    pub nodes: Vec<NodeWrapper>,
    #[serde(default)]
    pub edges: Vec<EdgeWrapper>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeWrapper {
    pub data: CytoscapeNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeWrapper {
    pub data: CytoscapeEdge,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CytoscapeNode {
    pub id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub workload: String,
    #[serde(default)]
    pub app: String,
    #[serde(default)]
    pub service: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CytoscapeEdge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub response_time: String,
    #[serde(default)]
    pub throughput: String,
    #[serde(default)]
    pub traffic: Option<Traffic>,
}

impl From<GraphSnapshot> for WorkloadGraph {
    fn from(snapshot: GraphSnapshot) -> Self {
        let mut nodes: Vec<WorkloadNode> = snapshot
            .elements
            .nodes
            .into_iter()
            .map(|n| WorkloadNode::new(n.data.id, n.data.workload))
            .collect();

        for edge in snapshot.elements.edges.into_iter().map(|e| e.data) {
            let Some(source) = nodes.iter_mut().find(|n| n.id == edge.source) else {
                debug!(edge = %edge.id, source = %edge.source, "Dropping edge with unknown source");
                continue;
            };

            let mut converted = Edge::new(edge.target, edge.throughput, edge.response_time);
            converted.traffic = edge.traffic;
            source.edges.push(converted);
        }

        WorkloadGraph::from_nodes(nodes)
    }
}
