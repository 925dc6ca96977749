//! Connections shared by every command

use anyhow::Result;
use scaler_lib::{GraphParams, GraphSource, KialiClient, KubeCluster, WorkloadGraph};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

pub struct Context {
    pub kiali: Arc<KialiClient>,
    pub namespace: String,
    kubeconfig: Option<PathBuf>,
}

impl Context {
    pub fn new(kiali_url: &str, namespace: &str, kubeconfig: Option<&str>) -> Result<Self> {
        Ok(Self {
            kiali: Arc::new(KialiClient::new(kiali_url)?),
            namespace: namespace.to_string(),
            kubeconfig: crate::config::kubeconfig_path(kubeconfig),
        })
    }

    /// Graph of the namespace over the given observation window
    pub async fn graph(&self, duration: &str) -> Result<WorkloadGraph> {
        self.kiali
            .fetch_workload_graph(
                std::slice::from_ref(&self.namespace),
                &GraphParams::with_duration(duration),
            )
            .await
    }

    /// Connect to the cluster; only commands that need it pay for it
    pub async fn cluster(&self) -> Result<Arc<KubeCluster>> {
        let cluster = match &self.kubeconfig {
            Some(path) => {
                debug!(kubeconfig = %path.display(), "Using kubeconfig");
                KubeCluster::from_kubeconfig(path).await?
            }
            None => KubeCluster::try_default().await?,
        };
        Ok(Arc::new(cluster))
    }
}
