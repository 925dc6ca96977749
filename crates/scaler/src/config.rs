//! Daemon configuration

use anyhow::{Context, Result};
use scaler_lib::{GraphParams, PodAggregation, ScalingLimits};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Variable naming an optional config file (JSON, TOML or YAML by extension)
pub const CONFIG_FILE_ENV: &str = "MESH_SCALER_CONFIG";

/// Prefix of environment overrides, e.g. `MESH_SCALER_NAMESPACE`
pub const ENV_PREFIX: &str = "MESH_SCALER";

/// Scaler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScalerConfig {
    /// Namespace whose deployments are scaled
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Kiali base URL
    #[serde(default = "default_kiali_url")]
    pub kiali_url: String,

    /// Resource and throughput threshold document
    #[serde(default = "default_thresholds_path")]
    pub thresholds_path: PathBuf,

    /// Queue-length threshold document from a profiling run
    #[serde(default = "default_queue_thresholds_path")]
    pub queue_thresholds_path: PathBuf,

    /// Seconds between control-loop cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Observation window of graph queries
    #[serde(default = "default_graph_duration")]
    pub graph_duration: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Ceiling on any computed replica target
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,

    /// How pod samples of one deployment are combined
    #[serde(default)]
    pub pod_aggregation: PodAggregation,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_kiali_url() -> String {
    "http://localhost:20001".to_string()
}

fn default_thresholds_path() -> PathBuf {
    PathBuf::from("thresholds.json")
}

fn default_queue_thresholds_path() -> PathBuf {
    PathBuf::from("queue.json")
}

fn default_interval() -> u64 {
    15
}

fn default_graph_duration() -> String {
    "5m".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_replicas() -> u32 {
    ScalingLimits::default().max_replicas
}

impl ScalerConfig {
    /// Load from the optional config file overlaid by the environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file)
    }

    pub fn load_from(file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read scaler configuration")?;

        let config: ScalerConfig = config
            .try_deserialize()
            .context("Invalid scaler configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.interval_secs > 0, "interval_secs must be positive");
        anyhow::ensure!(self.max_replicas > 0, "max_replicas must be positive");
        anyhow::ensure!(!self.namespace.is_empty(), "namespace must not be empty");
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn graph_params(&self) -> GraphParams {
        GraphParams::with_duration(self.graph_duration.clone())
    }

    pub fn limits(&self) -> ScalingLimits {
        ScalingLimits {
            max_replicas: self.max_replicas,
        }
    }
}
