//! Threshold violation detection
//!
//! Two independent checks run every cycle:
//! - throughput: end-to-end throughput at the ingress node below the floor
//! - resources: any deployment whose mean CPU or memory exceeds its limit
//!
//! Deployments found by the resource check are the *base* deployments of a
//! cycle, the root causes from which propagation starts.

use crate::cluster::{pods_for_deployment, ClusterControl, MetricsSource};
use crate::error::{ScalerError, ScalerResult};
use crate::graph::{GraphParams, GraphSource, WorkloadGraph};
use crate::models::{BaseDeployments, CheckOutcome, PodAggregation, ResourceSample};
use crate::thresholds::ThresholdConfig;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs throughput and resource checks against live telemetry
#[derive(Clone)]
pub struct ThresholdEvaluator {
    graphs: Arc<dyn GraphSource>,
    metrics: Arc<dyn MetricsSource>,
    cluster: Arc<dyn ClusterControl>,
    thresholds: Arc<ThresholdConfig>,
    namespace: String,
    graph_params: GraphParams,
    aggregation: PodAggregation,
}

impl ThresholdEvaluator {
    pub fn new(
        graphs: Arc<dyn GraphSource>,
        metrics: Arc<dyn MetricsSource>,
        cluster: Arc<dyn ClusterControl>,
        thresholds: Arc<ThresholdConfig>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            graphs,
            metrics,
            cluster,
            thresholds,
            namespace: namespace.into(),
            graph_params: GraphParams::default(),
            aggregation: PodAggregation::default(),
        }
    }

    pub fn with_graph_params(mut self, params: GraphParams) -> Self {
        self.graph_params = params;
        self
    }

    pub fn with_aggregation(mut self, aggregation: PodAggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    async fn fetch_graph(&self) -> ScalerResult<WorkloadGraph> {
        self.graphs
            .fetch_workload_graph(std::slice::from_ref(&self.namespace), &self.graph_params)
            .await
            .map_err(ScalerError::Graph)
    }

    /// Current end-to-end throughput of the mesh
    pub async fn end_to_end_throughput(&self) -> ScalerResult<i64> {
        self.fetch_graph().await?.end_to_end_throughput()
    }

    /// Current HTTP request rate entering the mesh
    pub async fn ingress_request_rate(&self) -> ScalerResult<f64> {
        self.fetch_graph().await?.ingress_request_rate()
    }

    /// Needs scale when end-to-end throughput is below the configured floor
    pub async fn check_throughput(&self) -> ScalerResult<CheckOutcome> {
        let current = self.end_to_end_throughput().await?;
        Ok(self.throughput_outcome(current))
    }

    /// Compare an observed throughput against the floor
    pub fn throughput_outcome(&self, throughput: i64) -> CheckOutcome {
        let floor = self.thresholds.throughput;
        debug!(throughput, threshold = floor, "Throughput check");

        if throughput < floor {
            info!(throughput, threshold = floor, "Throughput below threshold");
            CheckOutcome::NeedsScale
        } else {
            CheckOutcome::NoViolation
        }
    }

    /// Needs scale when at least one base deployment exists
    pub async fn check_resources(&self) -> ScalerResult<CheckOutcome> {
        let base = self.base_deployments().await?;
        if base.is_empty() {
            Ok(CheckOutcome::NoViolation)
        } else {
            Ok(CheckOutcome::NeedsScale)
        }
    }

    /// Deployments whose current usage exceeds an enabled limit
    pub async fn base_deployments(&self) -> ScalerResult<BaseDeployments> {
        let samples = self.deployment_samples().await?;
        let base = find_base_deployments(&self.thresholds, &samples);

        if !base.is_empty() {
            info!(
                deployments = ?base.keys().collect::<Vec<_>>(),
                "Resource thresholds exceeded"
            );
        }

        Ok(base)
    }

    /// Current resource sample of every deployment in the namespace
    pub async fn deployment_samples(&self) -> ScalerResult<BTreeMap<String, ResourceSample>> {
        let pods = self
            .cluster
            .list_pod_names(&self.namespace)
            .await
            .map_err(ScalerError::Cluster)?;
        let deployments = self
            .cluster
            .list_deployment_names(&self.namespace)
            .await
            .map_err(ScalerError::Cluster)?;

        let mut samples = BTreeMap::new();
        let mut fetched = 0usize;
        let mut last_error = None;

        for deployment in deployments {
            let mut pod_samples = Vec::new();

            for pod in pods_for_deployment(&deployment, &pods) {
                match self.metrics.fetch_pod_metrics(&self.namespace, pod).await {
                    Ok(containers) => {
                        fetched += 1;
                        pod_samples.push(ResourceSample::from_containers(&containers))
                    }
                    Err(e) => {
                        // Keep going to collect as many pods as possible
                        warn!(pod = %pod, error = %e, "Failed to get pod metrics");
                        last_error = Some(e);
                    }
                }
            }

            if let Some(sample) = aggregate(&pod_samples, self.aggregation) {
                samples.insert(deployment, sample);
            }
        }

        // Nothing could be read at all: the metrics API itself is down
        if fetched == 0 {
            if let Some(e) = last_error {
                return Err(ScalerError::Metrics(e));
            }
        }

        debug!(samples = ?samples, "Deployment resource samples");
        Ok(samples)
    }
}

/// Combine the per-pod samples of one deployment
pub fn aggregate(samples: &[ResourceSample], policy: PodAggregation) -> Option<ResourceSample> {
    match policy {
        PodAggregation::LastPod => samples.last().copied(),
        PodAggregation::Mean if samples.is_empty() => None,
        PodAggregation::Mean => Some(ResourceSample::mean(samples)),
    }
}

/// Deployments with a configured limit that their sample exceeds.
///
/// A deployment without a sample is treated as idle.
pub fn find_base_deployments(
    thresholds: &ThresholdConfig,
    samples: &BTreeMap<String, ResourceSample>,
) -> BaseDeployments {
    thresholds
        .resource_thresholds
        .iter()
        .filter_map(|(deployment, threshold)| {
            let sample = samples.get(deployment).copied().unwrap_or_default();
            threshold
                .is_exceeded_by(&sample)
                .then(|| (deployment.clone(), sample))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMesh;
    use crate::thresholds::ResourceThreshold;

    fn evaluator(mesh: &Arc<FakeMesh>, thresholds: ThresholdConfig) -> ThresholdEvaluator {
        ThresholdEvaluator::new(
            mesh.clone(),
            mesh.clone(),
            mesh.clone(),
            Arc::new(thresholds),
            "shop",
        )
    }

    #[tokio::test]
    async fn test_throughput_below_threshold_needs_scale() {
        let mesh = Arc::new(FakeMesh::new().with_graph(FakeMesh::ingress_graph(80)));
        let evaluator = evaluator(&mesh, ThresholdConfig::new(100));

        assert_eq!(evaluator.check_throughput().await.unwrap(), CheckOutcome::NeedsScale);
    }

    #[tokio::test]
    async fn test_throughput_at_threshold_is_fine() {
        let mesh = Arc::new(FakeMesh::new().with_graph(FakeMesh::ingress_graph(100)));
        let evaluator = evaluator(&mesh, ThresholdConfig::new(100));

        assert_eq!(evaluator.check_throughput().await.unwrap(), CheckOutcome::NoViolation);
    }

    #[tokio::test]
    async fn test_throughput_without_ingress_node_fails() {
        let graph = WorkloadGraph::from_nodes([crate::graph::WorkloadNode::new("a", "a")]);
        let mesh = Arc::new(FakeMesh::new().with_graph(graph));
        let evaluator = evaluator(&mesh, ThresholdConfig::new(100));

        assert!(matches!(
            evaluator.check_throughput().await,
            Err(ScalerError::NoIngressNode)
        ));
    }

    #[tokio::test]
    async fn test_throughput_graph_fetch_error() {
        let mesh = Arc::new(FakeMesh::new());
        mesh.fail_graph(true);
        let evaluator = evaluator(&mesh, ThresholdConfig::new(100));

        assert!(matches!(
            evaluator.check_throughput().await,
            Err(ScalerError::Graph(_))
        ));
    }

    #[tokio::test]
    async fn test_cpu_over_threshold_is_base_deployment() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 2)
                .with_deployment("b", 2)
                .with_pod("a-1234-x", &[(0.7, 10.0)])
                .with_pod("b-5678-y", &[(3.0, 10.0)]),
        );
        let thresholds = ThresholdConfig::new(0)
            .with_resource("a", ResourceThreshold::new(0.5, 0.0))
            .with_resource("b", ResourceThreshold::new(0.0, 0.0));
        let evaluator = evaluator(&mesh, thresholds);

        let base = evaluator.base_deployments().await.unwrap();
        assert_eq!(base.len(), 1);
        assert_eq!(base["a"], ResourceSample::new(0.7, 10.0));
        assert_eq!(evaluator.check_resources().await.unwrap(), CheckOutcome::NeedsScale);
    }

    #[tokio::test]
    async fn test_no_base_deployments_is_no_violation() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 1)
                .with_pod("a-1-x", &[(0.1, 10.0)]),
        );
        let thresholds =
            ThresholdConfig::new(0).with_resource("a", ResourceThreshold::new(0.5, 100.0));
        let evaluator = evaluator(&mesh, thresholds);

        assert_eq!(evaluator.check_resources().await.unwrap(), CheckOutcome::NoViolation);
    }

    #[tokio::test]
    async fn test_last_pod_sample_wins() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 2)
                .with_pod("a-1-x", &[(0.9, 0.0)])
                .with_pod("a-1-y", &[(0.1, 0.0), (0.3, 0.0)]),
        );
        let evaluator = evaluator(&mesh, ThresholdConfig::new(0));

        let samples = evaluator.deployment_samples().await.unwrap();
        assert!((samples["a"].cpu - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_mean_pod_aggregation() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 2)
                .with_pod("a-1-x", &[(0.9, 0.0)])
                .with_pod("a-1-y", &[(0.1, 0.0), (0.3, 0.0)]),
        );
        let evaluator =
            evaluator(&mesh, ThresholdConfig::new(0)).with_aggregation(PodAggregation::Mean);

        let samples = evaluator.deployment_samples().await.unwrap();
        assert!((samples["a"].cpu - 0.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_pod_metrics_failure_is_skipped() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 2)
                .with_pod("a-1-x", &[(0.9, 0.0)])
                .with_broken_pod("a-1-y"),
        );
        let evaluator = evaluator(&mesh, ThresholdConfig::new(0));

        let samples = evaluator.deployment_samples().await.unwrap();
        assert_eq!(samples["a"].cpu, 0.9);
    }

    #[tokio::test]
    async fn test_every_pod_metrics_failure_fails_check() {
        let mesh = Arc::new(
            FakeMesh::new()
                .with_deployment("a", 2)
                .with_broken_pod("a-1-x")
                .with_broken_pod("a-1-y"),
        );
        let evaluator = evaluator(&mesh, ThresholdConfig::new(0));

        assert!(matches!(
            evaluator.check_resources().await,
            Err(ScalerError::Metrics(_))
        ));
    }

    #[tokio::test]
    async fn test_pod_list_failure_fails_check() {
        let mesh = Arc::new(FakeMesh::new().with_deployment("a", 1));
        mesh.fail_listing(true);
        let evaluator = evaluator(&mesh, ThresholdConfig::new(0));

        assert!(matches!(
            evaluator.check_resources().await,
            Err(ScalerError::Cluster(_))
        ));
    }

    #[test]
    fn test_disabled_thresholds_never_base() {
        let thresholds = ThresholdConfig::new(0)
            .with_resource("a", ResourceThreshold::new(0.0, 0.0))
            .with_resource("b", ResourceThreshold::new(-1.0, -1.0));
        let mut samples = BTreeMap::new();
        samples.insert("a".to_string(), ResourceSample::new(100.0, 1e12));
        samples.insert("b".to_string(), ResourceSample::new(100.0, 1e12));

        assert!(find_base_deployments(&thresholds, &samples).is_empty());
    }

    #[test]
    fn test_deployment_without_sample_is_idle() {
        let thresholds =
            ThresholdConfig::new(0).with_resource("ghost", ResourceThreshold::new(0.1, 0.0));
        assert!(find_base_deployments(&thresholds, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_aggregate_empty() {
        assert!(aggregate(&[], PodAggregation::LastPod).is_none());
        assert!(aggregate(&[], PodAggregation::Mean).is_none());
    }
}
