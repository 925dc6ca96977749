//! Control loop
//!
//! Every interval the loop runs the throughput and resource checks
//! concurrently. When either signals, it re-reads the base deployments,
//! plans replica counts through propagation and applies the plan one
//! deployment at a time. Anything else that goes wrong aborts the cycle
//! without scaling and the loop waits for the next tick.

mod report;

#[cfg(test)]
mod tests;

pub use report::{CyclePlan, CycleReport, ScaleSummary};

use crate::cluster::{ClusterControl, MetricsSource};
use crate::error::{ScalerError, ScalerResult};
use crate::evaluator::ThresholdEvaluator;
use crate::graph::{GraphParams, GraphSource};
use crate::health::HealthRegistry;
use crate::models::{CheckOutcome, PodAggregation, ReplicaPlan};
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::propagation::PropagationEngine;
use crate::thresholds::{QueueLengthThresholds, ScalingLimits, ThresholdConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the control loop
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Namespace whose deployments are scaled
    pub namespace: String,
    /// Time between cycles (default: 15 seconds)
    pub interval: Duration,
    /// Graph query used by both checks and propagation
    pub graph_params: GraphParams,
    pub aggregation: PodAggregation,
    pub limits: ScalingLimits,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            interval: Duration::from_secs(15),
            graph_params: GraphParams::default(),
            aggregation: PodAggregation::default(),
            limits: ScalingLimits::default(),
        }
    }
}

/// Periodic evaluate-plan-apply loop over one namespace
pub struct ControlLoop {
    evaluator: ThresholdEvaluator,
    engine: PropagationEngine,
    cluster: Arc<dyn ClusterControl>,
    config: ControlConfig,
    health: Option<HealthRegistry>,
    metrics: Option<ScalerMetrics>,
    logger: StructuredLogger,
}

impl ControlLoop {
    pub fn builder() -> ControlLoopBuilder {
        ControlLoopBuilder::new()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    /// Run cycles until `shutdown` fires.
    ///
    /// The first cycle starts one interval after the call. Shutdown during a
    /// cycle drops its in-flight calls; scale requests already issued stay in
    /// effect. Always ends with [`ScalerError::Cancelled`].
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> ScalerResult<()> {
        info!(
            namespace = %self.config.namespace,
            interval_secs = self.config.interval.as_secs(),
            "Starting control loop"
        );

        let period = self.config.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let tick = tokio::select! {
                _ = ticker.tick() => true,
                _ = shutdown.recv() => false,
            };
            if !tick {
                break;
            }

            tokio::select! {
                result = self.run_cycle() => {
                    if let Ok(report) = result {
                        debug!(outcome = report.outcome(), "Cycle finished");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutdown requested during cycle");
                    break;
                }
            }
        }

        info!("Control loop stopped");
        Err(ScalerError::Cancelled)
    }

    /// Evaluate, and scale when a check signals.
    ///
    /// Errors mean the cycle aborted without issuing any scale call.
    pub async fn run_cycle(&self) -> ScalerResult<CycleReport> {
        let start = Instant::now();
        let result = self.evaluate_and_scale().await;

        if let Some(metrics) = &self.metrics {
            metrics.observe_cycle_duration(start.elapsed().as_secs_f64());
            let outcome = match &result {
                Ok(report) => report.outcome(),
                Err(_) => "aborted",
            };
            metrics.inc_cycle(outcome);
        }

        if let Err(e) = &result {
            self.logger.log_cycle_aborted(&e.to_string());
        }
        if let Some(health) = &self.health {
            health.record_cycle(&result).await;
        }

        result
    }

    async fn evaluate_and_scale(&self) -> ScalerResult<CycleReport> {
        let throughput_check = async {
            let throughput = self.evaluator.end_to_end_throughput().await?;
            if let Some(metrics) = &self.metrics {
                metrics.set_end_to_end_throughput(throughput);
            }
            Ok::<_, ScalerError>(self.evaluator.throughput_outcome(throughput))
        };
        let resource_check = self.evaluator.check_resources();

        let (throughput, resources) = tokio::join!(throughput_check, resource_check);

        let throughput_violation = matches!(throughput, Ok(CheckOutcome::NeedsScale));
        let resource_violation = matches!(resources, Ok(CheckOutcome::NeedsScale));

        if !throughput_violation && !resource_violation {
            if let (Err(_), Err(e)) = (&throughput, &resources) {
                warn!(error = %e, "Resource check failed as well");
            }
            throughput?;
            resources?;
            self.logger.log_no_violation();
            return Ok(CycleReport::NoViolation);
        }

        // One signal is enough; the other check's failure is only reported
        for e in [throughput.err(), resources.err()].into_iter().flatten() {
            warn!(error = %e, "Check failed in a triggered cycle");
        }

        self.logger
            .log_violation(throughput_violation, resource_violation);

        let CyclePlan { base, plan } = self.plan_once().await?;
        if base.is_empty() {
            info!("No deployment over its resource thresholds, nothing to scale");
        }

        let failed = self.apply_plan(&plan).await;

        Ok(CycleReport::Triggered(ScaleSummary {
            throughput_violation,
            resource_violation,
            base,
            plan,
            failed,
        }))
    }

    /// Read the current base deployments and plan replica counts from them,
    /// without scaling anything
    pub async fn plan_once(&self) -> ScalerResult<CyclePlan> {
        let base = self.evaluator.base_deployments().await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_base_deployments(base.len());
        }

        if base.is_empty() {
            return Ok(CyclePlan::default());
        }

        let plan = self.engine.plan(&base).await?;
        Ok(CyclePlan { base, plan })
    }

    /// Issue one scale call per planned deployment.
    ///
    /// A failed call is logged and the rest of the plan still applies.
    /// Returns the deployments that could not be scaled.
    pub async fn apply_plan(&self, plan: &ReplicaPlan) -> Vec<String> {
        let mut failed = Vec::new();

        for (deployment, &replicas) in plan {
            if let Some(metrics) = &self.metrics {
                metrics.set_planned_replicas(deployment, replicas);
            }

            let result = self
                .cluster
                .scale_deployment(&self.config.namespace, deployment, replicas)
                .await;

            if let Some(metrics) = &self.metrics {
                metrics.inc_scale_request(result.is_ok());
            }

            match result {
                Ok(()) => self.logger.log_deployment_scaled(deployment, replicas),
                Err(e) => {
                    self.logger
                        .log_scale_failed(deployment, replicas, &format!("{:#}", e));
                    failed.push(deployment.clone());
                }
            }
        }

        failed
    }
}

/// Builder for the control loop
pub struct ControlLoopBuilder {
    graphs: Option<Arc<dyn GraphSource>>,
    metrics_source: Option<Arc<dyn MetricsSource>>,
    cluster: Option<Arc<dyn ClusterControl>>,
    thresholds: Option<Arc<ThresholdConfig>>,
    queue_thresholds: Option<Arc<QueueLengthThresholds>>,
    config: ControlConfig,
    health: Option<HealthRegistry>,
    metrics: Option<ScalerMetrics>,
}

impl ControlLoopBuilder {
    pub fn new() -> Self {
        Self {
            graphs: None,
            metrics_source: None,
            cluster: None,
            thresholds: None,
            queue_thresholds: None,
            config: ControlConfig::default(),
            health: None,
            metrics: None,
        }
    }

    pub fn graph_source(mut self, graphs: Arc<dyn GraphSource>) -> Self {
        self.graphs = Some(graphs);
        self
    }

    pub fn metrics_source(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics_source = Some(metrics);
        self
    }

    pub fn cluster(mut self, cluster: Arc<dyn ClusterControl>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn thresholds(mut self, thresholds: Arc<ThresholdConfig>) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn queue_thresholds(mut self, thresholds: Arc<QueueLengthThresholds>) -> Self {
        self.queue_thresholds = Some(thresholds);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn graph_params(mut self, params: GraphParams) -> Self {
        self.config.graph_params = params;
        self
    }

    pub fn aggregation(mut self, aggregation: PodAggregation) -> Self {
        self.config.aggregation = aggregation;
        self
    }

    pub fn limits(mut self, limits: ScalingLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn metrics(mut self, metrics: ScalerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> ScalerResult<ControlLoop> {
        let missing = |what: &str| ScalerError::Config(format!("{} is required", what));

        let graphs = self.graphs.ok_or_else(|| missing("Graph source"))?;
        let metrics_source = self
            .metrics_source
            .ok_or_else(|| missing("Metrics source"))?;
        let cluster = self.cluster.ok_or_else(|| missing("Cluster"))?;
        let thresholds = self.thresholds.ok_or_else(|| missing("Thresholds"))?;
        let queue_thresholds = self
            .queue_thresholds
            .ok_or_else(|| missing("Queue-length thresholds"))?;

        if self.config.interval.is_zero() {
            return Err(ScalerError::Config("interval must be positive".to_string()));
        }

        let config = self.config;

        let evaluator = ThresholdEvaluator::new(
            graphs.clone(),
            metrics_source,
            cluster.clone(),
            thresholds.clone(),
            config.namespace.clone(),
        )
        .with_graph_params(config.graph_params.clone())
        .with_aggregation(config.aggregation);

        let engine = PropagationEngine::new(
            graphs,
            cluster.clone(),
            thresholds,
            queue_thresholds,
            config.namespace.clone(),
        )
        .with_graph_params(config.graph_params.clone())
        .with_limits(config.limits);

        Ok(ControlLoop {
            evaluator,
            engine,
            cluster,
            logger: StructuredLogger::new(config.namespace.clone()),
            config,
            health: self.health,
            metrics: self.metrics,
        })
    }
}

impl Default for ControlLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}
