//! Core data models for the mesh scaler

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean CPU (cores) and memory (bytes) usage of a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu: f64,
    pub memory: f64,
}

impl ResourceSample {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self { cpu, memory }
    }

    /// Average the instantaneous usage of a pod's containers.
    ///
    /// A pod without containers yields the zero sample.
    pub fn from_containers(containers: &[ContainerUsage]) -> Self {
        if containers.is_empty() {
            return Self::default();
        }

        let count = containers.len() as f64;
        let cpu: f64 = containers.iter().map(|c| c.cpu_cores).sum();
        let memory: f64 = containers.iter().map(|c| c.memory_bytes).sum();

        Self {
            cpu: cpu / count,
            memory: memory / count,
        }
    }

    /// Arithmetic mean of several samples
    pub fn mean(samples: &[ResourceSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let count = samples.len() as f64;
        Self {
            cpu: samples.iter().map(|s| s.cpu).sum::<f64>() / count,
            memory: samples.iter().map(|s| s.memory).sum::<f64>() / count,
        }
    }
}

/// Instantaneous usage of one container as reported by the metrics API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerUsage {
    pub name: String,
    pub cpu_cores: f64,
    pub memory_bytes: f64,
}

/// How per-pod samples of one deployment are combined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodAggregation {
    /// Keep the sample of the last pod observed for the deployment
    #[default]
    LastPod,
    /// Average the samples of every pod of the deployment
    Mean,
}

/// Result of one threshold check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A limit was crossed and the cycle should scale
    NeedsScale,
    /// Everything within limits
    NoViolation,
}

impl CheckOutcome {
    pub fn needs_scale(&self) -> bool {
        matches!(self, CheckOutcome::NeedsScale)
    }
}

/// Deployments whose own usage crossed a threshold, with the offending sample
pub type BaseDeployments = BTreeMap<String, ResourceSample>;

/// Desired replica counts for one cycle.
///
/// Only deployments whose target exceeds the count observed at the start of
/// the cycle are present.
pub type ReplicaPlan = BTreeMap<String, u32>;
