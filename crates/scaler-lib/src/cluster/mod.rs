//! Cluster access
//!
//! Two narrow capabilities the engine needs from Kubernetes: reading pod
//! resource usage from the metrics API, and listing/scaling deployments.
//! [`KubeCluster`] implements both against a live cluster.

mod kubernetes;
mod quantity;

pub use kubernetes::KubeCluster;
pub use quantity::{parse_cpu, parse_memory, parse_quantity};

use crate::models::ContainerUsage;
use anyhow::Result;
use async_trait::async_trait;

/// Source of per-pod container usage
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Current usage of every container in a pod
    async fn fetch_pod_metrics(&self, namespace: &str, pod: &str) -> Result<Vec<ContainerUsage>>;
}

/// Read and mutate deployment replica counts
#[async_trait]
pub trait ClusterControl: Send + Sync {
    async fn list_deployment_names(&self, namespace: &str) -> Result<Vec<String>>;

    async fn list_pod_names(&self, namespace: &str) -> Result<Vec<String>>;

    /// Replica count currently reported in the deployment status
    async fn current_replica_count(&self, namespace: &str, deployment: &str) -> Result<u32>;

    async fn scale_deployment(&self, namespace: &str, deployment: &str, replicas: u32)
        -> Result<()>;
}

/// Pods belonging to a deployment, matched by the `<deployment>-` name prefix
pub fn pods_for_deployment<'a>(deployment: &str, pods: &'a [String]) -> Vec<&'a str> {
    let prefix = format!("{}-", deployment);
    pods.iter()
        .filter(|p| p.starts_with(&prefix))
        .map(String::as_str)
        .collect()
}
