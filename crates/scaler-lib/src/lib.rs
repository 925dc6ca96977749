//! Dependency-aware autoscaling for service-mesh workloads
//!
//! This crate provides the core functionality for:
//! - Building a workload dependency graph from mesh telemetry
//! - Detecting throughput and resource threshold violations
//! - Propagating replica increases to downstream workloads
//! - Running the periodic control loop that applies replica plans
//! - Profiling queue-length thresholds under load
//! - Health checks and observability

pub mod cluster;
pub mod control;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod health;
pub mod models;
pub mod observability;
pub mod profiler;
pub mod propagation;
pub mod thresholds;

#[cfg(test)]
pub(crate) mod testing;

pub use cluster::{ClusterControl, KubeCluster, MetricsSource};
pub use control::{ControlLoop, ControlLoopBuilder, CyclePlan, CycleReport, ScaleSummary};
pub use error::{ScalerError, ScalerResult};
pub use evaluator::ThresholdEvaluator;
pub use graph::{GraphParams, GraphSource, KialiClient, QueueLengths, WorkloadGraph};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthReport, Readiness,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use profiler::{ProfilerConfig, QueueLengthProfiler};
pub use propagation::PropagationEngine;
pub use thresholds::{QueueLengthThresholds, ResourceThreshold, ScalingLimits, ThresholdConfig};
