//! Scaling thresholds
//!
//! Two documents drive the engine. The threshold document holds per-deployment
//! CPU/memory limits and the end-to-end throughput floor:
//!
//! ```json
//! { "resourceThresholds": { "auth": { "cpu": 500, "memory": 0 } }, "throughput": 100 }
//! ```
//!
//! CPU limits are written in millicores and normalized to cores on load.
//! Memory limits are bytes. A limit of 0 or less is disabled.
//!
//! The queue-length document maps deployments to the maximum queue length
//! one replica sustains, as recorded by a profiling run:
//!
//! ```json
//! { "auth": 12.5, "db": 40.0 }
//! ```
//!
//! Both are loaded once at startup and never mutated afterwards.

use crate::error::{ScalerError, ScalerResult};
use crate::models::ResourceSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// CPU (cores) and memory (bytes) limits of one deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceThreshold {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
}

impl ResourceThreshold {
    pub fn new(cpu: f64, memory: f64) -> Self {
        Self { cpu, memory }
    }

    pub fn cpu_enabled(&self) -> bool {
        self.cpu > 0.0
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory > 0.0
    }

    /// True when an enabled limit is strictly exceeded by the sample
    pub fn is_exceeded_by(&self, sample: &ResourceSample) -> bool {
        (self.cpu_enabled() && sample.cpu > self.cpu)
            || (self.memory_enabled() && sample.memory > self.memory)
    }
}

/// Resource limits and the throughput floor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdConfig {
    #[serde(default)]
    pub resource_thresholds: BTreeMap<String, ResourceThreshold>,
    #[serde(default)]
    pub throughput: i64,
}

impl ThresholdConfig {
    pub fn new(throughput: i64) -> Self {
        Self {
            resource_thresholds: BTreeMap::new(),
            throughput,
        }
    }

    /// Add a deployment limit, CPU already in cores
    pub fn with_resource(mut self, deployment: impl Into<String>, threshold: ResourceThreshold) -> Self {
        self.resource_thresholds.insert(deployment.into(), threshold);
        self
    }

    pub fn threshold(&self, deployment: &str) -> Option<&ResourceThreshold> {
        self.resource_thresholds.get(deployment)
    }

    /// Parse a threshold document, converting CPU millicores to cores
    pub fn from_json(document: &str) -> ScalerResult<Self> {
        let mut config: ThresholdConfig = serde_json::from_str(document)?;
        for threshold in config.resource_thresholds.values_mut() {
            threshold.cpu /= 1000.0;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> ScalerResult<Self> {
        let document = std::fs::read_to_string(path).map_err(|e| {
            ScalerError::Config(format!("cannot read thresholds {}: {}", path.display(), e))
        })?;
        Self::from_json(&document)
    }
}

/// Per-deployment queue length one replica sustains
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueLengthThresholds(BTreeMap<String, f64>);

impl QueueLengthThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, deployment: impl Into<String>, threshold: f64) {
        self.0.insert(deployment.into(), threshold);
    }

    pub fn with(mut self, deployment: impl Into<String>, threshold: f64) -> Self {
        self.insert(deployment, threshold);
        self
    }

    /// Usable threshold for a deployment; missing, zero or negative values
    /// mean the deployment cannot be scaled by propagation
    pub fn usable(&self, deployment: &str) -> Option<f64> {
        self.0
            .get(deployment)
            .copied()
            .filter(|t| t.is_finite() && *t > 0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_json(document: &str) -> ScalerResult<Self> {
        Ok(serde_json::from_str(document)?)
    }

    pub fn load(path: &Path) -> ScalerResult<Self> {
        let document = std::fs::read_to_string(path).map_err(|e| {
            ScalerError::Config(format!(
                "cannot read queue-length thresholds {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&document)
    }

    /// Write the document as pretty JSON
    pub fn save(&self, path: &Path) -> ScalerResult<()> {
        let document = serde_json::to_string_pretty(self)?;
        std::fs::write(path, document)?;
        Ok(())
    }
}

impl FromIterator<(String, f64)> for QueueLengthThresholds {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Bounds applied to every computed replica target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingLimits {
    pub max_replicas: u32,
}

impl Default for ScalingLimits {
    fn default() -> Self {
        Self { max_replicas: 100 }
    }
}

impl ScalingLimits {
    /// Cap a target at the ceiling, never below what is already running
    pub fn clamp(&self, target: u32, current: u32) -> u32 {
        target.min(self.max_replicas.max(current))
    }
}
