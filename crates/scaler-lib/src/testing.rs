//! In-memory mesh implementing every collaborator trait, for tests

use crate::cluster::{ClusterControl, MetricsSource};
use crate::graph::{Edge, GraphParams, GraphSource, WorkloadGraph, WorkloadNode, UNKNOWN_WORKLOAD};
use crate::models::ContainerUsage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeMesh {
    graph: Mutex<WorkloadGraph>,
    graph_fails: AtomicBool,
    graph_fetches: AtomicUsize,
    listing_fails: AtomicBool,
    replicas: Mutex<BTreeMap<String, u32>>,
    /// Pods in listing order; `None` usage means the metrics fetch fails
    pods: Mutex<Vec<(String, Option<Vec<ContainerUsage>>)>>,
    failing_scales: Mutex<HashSet<String>>,
    scale_calls: Mutex<Vec<(String, u32)>>,
}

impl FakeMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// unknown -> a with the given whole throughput
    pub fn ingress_graph(throughput: i64) -> WorkloadGraph {
        WorkloadGraph::from_nodes([
            WorkloadNode::new("n0", UNKNOWN_WORKLOAD)
                .with_edge(Edge::new("n1", throughput.to_string(), "0.1")),
            WorkloadNode::new("n1", "a"),
        ])
    }

    pub fn with_graph(self, graph: WorkloadGraph) -> Self {
        self.set_graph(graph);
        self
    }

    pub fn with_deployment(self, name: &str, replicas: u32) -> Self {
        self.replicas.lock().unwrap().insert(name.to_string(), replicas);
        self
    }

    /// Pod with one container per `(cpu, memory)` pair
    pub fn with_pod(self, name: &str, containers: &[(f64, f64)]) -> Self {
        let usage = containers
            .iter()
            .enumerate()
            .map(|(i, (cpu, memory))| ContainerUsage {
                name: format!("c{}", i),
                cpu_cores: *cpu,
                memory_bytes: *memory,
            })
            .collect();
        self.pods.lock().unwrap().push((name.to_string(), Some(usage)));
        self
    }

    pub fn with_broken_pod(self, name: &str) -> Self {
        self.pods.lock().unwrap().push((name.to_string(), None));
        self
    }

    pub fn with_failing_scale(self, deployment: &str) -> Self {
        self.failing_scales
            .lock()
            .unwrap()
            .insert(deployment.to_string());
        self
    }

    pub fn set_graph(&self, graph: WorkloadGraph) {
        *self.graph.lock().unwrap() = graph;
    }

    pub fn fail_graph(&self, fail: bool) {
        self.graph_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    pub fn graph_fetches(&self) -> usize {
        self.graph_fetches.load(Ordering::SeqCst)
    }

    /// Successful and failed scale calls, in order
    pub fn scale_calls(&self) -> Vec<(String, u32)> {
        self.scale_calls.lock().unwrap().clone()
    }

    pub fn replicas(&self, deployment: &str) -> Option<u32> {
        self.replicas.lock().unwrap().get(deployment).copied()
    }
}

#[async_trait]
impl GraphSource for FakeMesh {
    async fn fetch_workload_graph(
        &self,
        _namespaces: &[String],
        _params: &GraphParams,
    ) -> Result<WorkloadGraph> {
        self.graph_fetches.fetch_add(1, Ordering::SeqCst);
        if self.graph_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("graph backend unavailable"));
        }
        Ok(self.graph.lock().unwrap().clone())
    }
}

#[async_trait]
impl MetricsSource for FakeMesh {
    async fn fetch_pod_metrics(&self, _namespace: &str, pod: &str) -> Result<Vec<ContainerUsage>> {
        let pods = self.pods.lock().unwrap();
        match pods.iter().find(|(name, _)| name == pod) {
            Some((_, Some(usage))) => Ok(usage.clone()),
            Some((_, None)) => Err(anyhow!("metrics unavailable for {}", pod)),
            None => Err(anyhow!("pod {} not found", pod)),
        }
    }
}

#[async_trait]
impl ClusterControl for FakeMesh {
    async fn list_deployment_names(&self, _namespace: &str) -> Result<Vec<String>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("api server unavailable"));
        }
        Ok(self.replicas.lock().unwrap().keys().cloned().collect())
    }

    async fn list_pod_names(&self, _namespace: &str) -> Result<Vec<String>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("api server unavailable"));
        }
        Ok(self
            .pods
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn current_replica_count(&self, _namespace: &str, deployment: &str) -> Result<u32> {
        self.replicas(deployment)
            .ok_or_else(|| anyhow!("deployment {} not found", deployment))
    }

    async fn scale_deployment(&self, _namespace: &str, deployment: &str, replicas: u32) -> Result<()> {
        self.scale_calls
            .lock()
            .unwrap()
            .push((deployment.to_string(), replicas));

        if self.failing_scales.lock().unwrap().contains(deployment) {
            return Err(anyhow!("scale of {} rejected", deployment));
        }
        self.replicas
            .lock()
            .unwrap()
            .insert(deployment.to_string(), replicas);
        Ok(())
    }
}
