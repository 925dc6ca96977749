//! Replica propagation
//!
//! Translates the replica increase of each base deployment into increases for
//! the workloads downstream of it. Base deployments get an HPA-style target
//! from their own usage; every other workload is sized from the queue length
//! it is projected to receive once its callers scale up.
//!
//! The walk is breadth-first. A workload is re-visited only when its working
//! replica count strictly increases, and every target is capped by
//! [`ScalingLimits`], so the walk terminates on cyclic graphs too.

use crate::cluster::ClusterControl;
use crate::error::{ScalerError, ScalerResult};
use crate::graph::{GraphParams, GraphSource, QueueLengths, WorkloadGraph, UNKNOWN_WORKLOAD};
use crate::models::{BaseDeployments, ReplicaPlan, ResourceSample};
use crate::thresholds::{QueueLengthThresholds, ResourceThreshold, ScalingLimits, ThresholdConfig};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Replica counts keyed by deployment name
pub type ReplicaCounts = BTreeMap<String, u32>;

/// HPA-style target for a deployment over its own limits.
///
/// `ceil(current * usage / limit)` per enabled metric, larger of the two.
/// Returns `None` when no metric is enabled.
pub fn hpa_target(current: u32, sample: &ResourceSample, threshold: &ResourceThreshold) -> Option<u32> {
    let scaled = |usage: f64, limit: f64| (f64::from(current) * usage / limit).ceil().max(0.0) as u32;

    let cpu = threshold
        .cpu_enabled()
        .then(|| scaled(sample.cpu, threshold.cpu));
    let memory = threshold
        .memory_enabled()
        .then(|| scaled(sample.memory, threshold.memory));

    cpu.into_iter().chain(memory).max()
}

/// Dampened queue length a workload receives once its caller scaled by `ratio`
pub fn projected_queue_length(queue_length: f64, ratio: f64) -> f64 {
    queue_length * (ratio / (ratio + ratio * ratio + 1.0))
}

/// Inputs of one propagation run, all read-only
pub struct PropagationInput<'a> {
    pub graph: &'a WorkloadGraph,
    pub base: &'a BaseDeployments,
    /// Replica counts observed at the start of the cycle
    pub replicas: &'a ReplicaCounts,
    pub thresholds: &'a ThresholdConfig,
    pub queue_thresholds: &'a QueueLengthThresholds,
    pub limits: ScalingLimits,
}

impl PropagationInput<'_> {
    /// Compute the replica plan.
    ///
    /// The result only holds deployments whose target is above the count
    /// observed at the start of the cycle.
    pub fn plan(&self) -> ReplicaPlan {
        let old = self.replicas;
        let mut working = old.clone();
        let mut queue = VecDeque::new();
        let queue_lengths = self.graph.queue_lengths();

        for (deployment, sample) in self.base {
            let current = old.get(deployment).copied().unwrap_or(0);
            let threshold = self
                .thresholds
                .threshold(deployment)
                .copied()
                .unwrap_or_default();

            if let Some(target) = hpa_target(current, sample, &threshold) {
                let target = self.limits.clamp(target, current);
                let entry = working.entry(deployment.clone()).or_insert(current);
                *entry = (*entry).max(target);
                debug!(deployment = %deployment, current, target, "Base deployment target");
            }

            queue.push_back(deployment.clone());
        }

        while let Some(deployment) = queue.pop_front() {
            for downstream in self.propagate_from(&deployment, &queue_lengths, &mut working) {
                queue.push_back(downstream);
            }
        }

        working
            .into_iter()
            .filter(|(deployment, target)| *target > old.get(deployment).copied().unwrap_or(0))
            .collect()
    }

    /// Resize the direct downstream workloads of `deployment`, returning those
    /// that grew
    fn propagate_from(
        &self,
        deployment: &str,
        queue_lengths: &QueueLengths,
        working: &mut ReplicaCounts,
    ) -> Vec<String> {
        let Some(node) = self.graph.node_by_workload(deployment) else {
            return Vec::new();
        };

        let old = self.replicas.get(deployment).copied().unwrap_or(0);
        if old == 0 {
            warn!(deployment = %deployment, "No running replicas, not propagating");
            return Vec::new();
        }
        let current = working.get(deployment).copied().unwrap_or(old);
        let ratio = f64::from(current) / f64::from(old);

        let mut grown = Vec::new();
        for edge in &node.edges {
            let Some(downstream) = self.graph.workload_of(&edge.target) else {
                continue;
            };
            if downstream == UNKNOWN_WORKLOAD {
                continue;
            }

            let Some(queue_threshold) = self.queue_thresholds.usable(downstream) else {
                debug!(deployment = %downstream, "No queue-length threshold, skipping");
                continue;
            };

            let downstream_old = self.replicas.get(downstream).copied().unwrap_or(0);
            let downstream_current = working.get(downstream).copied().unwrap_or(downstream_old);

            let projected = projected_queue_length(queue_lengths.get(downstream), ratio);
            let required = (projected / queue_threshold).ceil().max(0.0) * f64::from(downstream_current);
            let required = self
                .limits
                .clamp(required.min(f64::from(u32::MAX)) as u32, downstream_old);

            if required > downstream_current {
                debug!(
                    upstream = %deployment,
                    deployment = %downstream,
                    from = downstream_current,
                    to = required,
                    projected_queue_length = projected,
                    "Propagating scale-up"
                );
                working.insert(downstream.to_string(), required);
                grown.push(downstream.to_string());
            }
        }

        grown
    }
}

/// Plans replica counts against the live graph and cluster
#[derive(Clone)]
pub struct PropagationEngine {
    graphs: Arc<dyn GraphSource>,
    cluster: Arc<dyn ClusterControl>,
    thresholds: Arc<ThresholdConfig>,
    queue_thresholds: Arc<QueueLengthThresholds>,
    limits: ScalingLimits,
    namespace: String,
    graph_params: GraphParams,
}

impl PropagationEngine {
    pub fn new(
        graphs: Arc<dyn GraphSource>,
        cluster: Arc<dyn ClusterControl>,
        thresholds: Arc<ThresholdConfig>,
        queue_thresholds: Arc<QueueLengthThresholds>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            graphs,
            cluster,
            thresholds,
            queue_thresholds,
            limits: ScalingLimits::default(),
            namespace: namespace.into(),
            graph_params: GraphParams::default(),
        }
    }

    pub fn with_limits(mut self, limits: ScalingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_graph_params(mut self, params: GraphParams) -> Self {
        self.graph_params = params;
        self
    }

    /// Fetch a fresh graph and replica counts, then plan from `base`
    pub async fn plan(&self, base: &BaseDeployments) -> ScalerResult<ReplicaPlan> {
        let graph = self
            .graphs
            .fetch_workload_graph(std::slice::from_ref(&self.namespace), &self.graph_params)
            .await
            .map_err(ScalerError::Graph)?;

        let mut deployments = graph.workloads();
        deployments.extend(base.keys().filter(|d| graph.node_by_workload(d).is_none()).cloned());

        let replicas = self.replica_counts(&deployments).await?;

        let plan = PropagationInput {
            graph: &graph,
            base,
            replicas: &replicas,
            thresholds: &self.thresholds,
            queue_thresholds: &self.queue_thresholds,
            limits: self.limits,
        }
        .plan();

        debug!(plan = ?plan, "Replica plan computed");
        Ok(plan)
    }

    async fn replica_counts(&self, deployments: &[String]) -> ScalerResult<ReplicaCounts> {
        let mut replicas = ReplicaCounts::new();
        for deployment in deployments {
            let count = self
                .cluster
                .current_replica_count(&self.namespace, deployment)
                .await
                .map_err(ScalerError::Cluster)?;
            replicas.insert(deployment.clone(), count);
        }
        Ok(replicas)
    }
}
