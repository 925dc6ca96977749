//! Observability for the scaler
//!
//! Provides:
//! - Prometheus metrics (cycle latency and outcomes, observed throughput, scale requests)
//! - Structured logging of control-loop events with tracing

use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Histogram, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Cycle latency buckets in seconds; a cycle makes several HTTP round trips
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<ScalerMetricsInner> = OnceLock::new();

struct ScalerMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles_total: IntCounterVec,
    end_to_end_throughput: IntGauge,
    base_deployments: IntGauge,
    scale_requests_total: IntCounterVec,
    planned_replicas: IntGaugeVec,
}

impl ScalerMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "mesh_scaler_cycle_duration_seconds",
                "Time spent evaluating and applying one control-loop cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles_total: register_int_counter_vec!(
                "mesh_scaler_cycles_total",
                "Control-loop cycles by outcome",
                &["outcome"]
            )
            .expect("Failed to register cycles_total"),

            end_to_end_throughput: register_int_gauge!(
                "mesh_scaler_end_to_end_throughput",
                "Last observed end-to-end throughput at the ingress node"
            )
            .expect("Failed to register end_to_end_throughput"),

            base_deployments: register_int_gauge!(
                "mesh_scaler_base_deployments",
                "Deployments over their resource thresholds in the last triggered cycle"
            )
            .expect("Failed to register base_deployments"),

            scale_requests_total: register_int_counter_vec!(
                "mesh_scaler_scale_requests_total",
                "Scale requests issued to the cluster by result",
                &["result"]
            )
            .expect("Failed to register scale_requests_total"),

            planned_replicas: register_int_gauge_vec!(
                "mesh_scaler_planned_replicas",
                "Replica target of the last plan per deployment",
                &["deployment"]
            )
            .expect("Failed to register planned_replicas"),
        }
    }
}

/// Handle to the process-wide scaler metrics.
///
/// Clones share the same underlying collectors.
#[derive(Clone)]
pub struct ScalerMetrics {
    _private: (),
}

impl Default for ScalerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ScalerMetricsInner {
        GLOBAL_METRICS.get_or_init(ScalerMetricsInner::new)
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    /// Count a finished cycle under `outcome` (no_violation, scaled, aborted)
    pub fn inc_cycle(&self, outcome: &str) {
        self.inner().cycles_total.with_label_values(&[outcome]).inc();
    }

    pub fn set_end_to_end_throughput(&self, throughput: i64) {
        self.inner().end_to_end_throughput.set(throughput);
    }

    pub fn set_base_deployments(&self, count: usize) {
        self.inner()
            .base_deployments
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn inc_scale_request(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.inner()
            .scale_requests_total
            .with_label_values(&[result])
            .inc();
    }

    pub fn set_planned_replicas(&self, deployment: &str, replicas: u32) {
        self.inner()
            .planned_replicas
            .with_label_values(&[deployment])
            .set(i64::from(replicas));
    }
}

/// Structured logger for control-loop events
#[derive(Clone)]
pub struct StructuredLogger {
    namespace: String,
}

impl StructuredLogger {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn log_startup(&self, version: &str, interval_secs: u64) {
        info!(
            event = "scaler_started",
            namespace = %self.namespace,
            scaler_version = %version,
            interval_secs = interval_secs,
            "Mesh scaler started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "scaler_shutdown",
            namespace = %self.namespace,
            reason = %reason,
            "Mesh scaler shutting down"
        );
    }

    /// A cycle crossed at least one threshold
    pub fn log_violation(&self, throughput: bool, resources: bool) {
        info!(
            event = "violation_detected",
            namespace = %self.namespace,
            throughput_violation = throughput,
            resource_violation = resources,
            "Threshold violation detected"
        );
    }

    pub fn log_no_violation(&self) {
        info!(
            event = "no_violation",
            namespace = %self.namespace,
            "No threshold violation"
        );
    }

    pub fn log_deployment_scaled(&self, deployment: &str, replicas: u32) {
        info!(
            event = "deployment_scaled",
            namespace = %self.namespace,
            deployment = %deployment,
            replicas = replicas,
            "Deployment scaled"
        );
    }

    pub fn log_scale_failed(&self, deployment: &str, replicas: u32, error: &str) {
        warn!(
            event = "scale_failed",
            namespace = %self.namespace,
            deployment = %deployment,
            replicas = replicas,
            error = %error,
            "Failed to scale deployment"
        );
    }

    pub fn log_cycle_aborted(&self, error: &str) {
        warn!(
            event = "cycle_aborted",
            namespace = %self.namespace,
            error = %error,
            "Cycle aborted without scaling"
        );
    }
}
