//! kube-rs backed cluster and metrics access

use super::{parse_cpu, parse_memory, ClusterControl, MetricsSource};
use crate::models::ContainerUsage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Client, Config, ResourceExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Container entry of a `metrics.k8s.io/v1beta1` PodMetrics object
#[derive(Debug, Deserialize)]
struct PodMetricsContainer {
    name: String,
    #[serde(default)]
    usage: BTreeMap<String, String>,
}

/// Cluster access through the Kubernetes API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    pod_metrics: ApiResource,
}

impl KubeCluster {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk("metrics.k8s.io", "v1beta1", "PodMetrics");
        Self {
            client,
            pod_metrics: ApiResource::from_gvk_with_plural(&gvk, "pods"),
        }
    }

    /// Connect using the local kubeconfig, falling back to in-cluster config
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        info!("Connected to Kubernetes API");
        Ok(Self::new(client))
    }

    /// Connect using an explicit kubeconfig file
    pub async fn from_kubeconfig(path: &Path) -> Result<Self> {
        let kubeconfig = Kubeconfig::read_from(path)
            .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .context("Invalid kubeconfig")?;
        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        Ok(Self::new(client))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Convert the `containers` array of a PodMetrics object
fn container_usage(containers: &serde_json::Value) -> Result<Vec<ContainerUsage>> {
    let containers: Vec<PodMetricsContainer> =
        serde_json::from_value(containers.clone()).context("Malformed PodMetrics containers")?;

    Ok(containers
        .into_iter()
        .map(|c| {
            let cpu = c.usage.get("cpu").map(String::as_str).unwrap_or("0");
            let memory = c.usage.get("memory").map(String::as_str).unwrap_or("0");
            let cpu_cores = parse_cpu(cpu).unwrap_or_else(|| {
                warn!(container = %c.name, value = %cpu, "Unparsable CPU quantity");
                0.0
            });
            let memory_bytes = parse_memory(memory).unwrap_or_else(|| {
                warn!(container = %c.name, value = %memory, "Unparsable memory quantity");
                0.0
            });

            ContainerUsage {
                name: c.name,
                cpu_cores,
                memory_bytes,
            }
        })
        .collect())
}

#[async_trait]
impl MetricsSource for KubeCluster {
    async fn fetch_pod_metrics(&self, namespace: &str, pod: &str) -> Result<Vec<ContainerUsage>> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), namespace, &self.pod_metrics);

        let metrics = api
            .get(pod)
            .await
            .with_context(|| format!("Failed to get metrics of pod {}/{}", namespace, pod))?;

        match metrics.data.get("containers") {
            Some(containers) => container_usage(containers),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ClusterControl for KubeCluster {
    async fn list_deployment_names(&self, namespace: &str) -> Result<Vec<String>> {
        let deployments = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list deployments in {}", namespace))?;

        Ok(deployments.items.iter().map(|d| d.name_any()).collect())
    }

    async fn list_pod_names(&self, namespace: &str) -> Result<Vec<String>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = pods
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list pods in {}", namespace))?;

        Ok(pods.items.iter().map(|p| p.name_any()).collect())
    }

    async fn current_replica_count(&self, namespace: &str, deployment: &str) -> Result<u32> {
        let found = self
            .deployments(namespace)
            .get(deployment)
            .await
            .with_context(|| format!("Failed to get deployment {}/{}", namespace, deployment))?;

        let replicas = found.status.and_then(|s| s.replicas).unwrap_or(0);
        Ok(u32::try_from(replicas).unwrap_or(0))
    }

    async fn scale_deployment(
        &self,
        namespace: &str,
        deployment: &str,
        replicas: u32,
    ) -> Result<()> {
        let patch = serde_json::json!({ "spec": { "replicas": replicas } });

        self.deployments(namespace)
            .patch_scale(deployment, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to scale deployment {}/{}", namespace, deployment))?;

        debug!(namespace = %namespace, deployment = %deployment, replicas, "Scale patch applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_usage_from_pod_metrics() {
        let containers = serde_json::json!([
            {"name": "auth", "usage": {"cpu": "250m", "memory": "128Mi"}},
            {"name": "istio-proxy", "usage": {"cpu": "5000000n", "memory": "40Mi"}}
        ]);

        let usage = container_usage(&containers).unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].name, "auth");
        assert!((usage[0].cpu_cores - 0.25).abs() < 1e-9);
        assert_eq!(usage[0].memory_bytes, 134_217_728.0);
        assert!((usage[1].cpu_cores - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_container_usage_missing_or_bad_values_are_zero() {
        let containers = serde_json::json!([
            {"name": "app", "usage": {"cpu": "lots"}},
            {"name": "sidecar"}
        ]);

        let usage = container_usage(&containers).unwrap();
        assert_eq!(usage[0].cpu_cores, 0.0);
        assert_eq!(usage[0].memory_bytes, 0.0);
        assert_eq!(usage[1].cpu_cores, 0.0);
    }

    #[test]
    fn test_container_usage_malformed() {
        let containers = serde_json::json!({"not": "a list"});
        assert!(container_usage(&containers).is_err());
    }
}
