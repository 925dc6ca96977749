//! HTTP client for the Kiali graph API

use super::{GraphParams, GraphSnapshot, GraphSource, WorkloadGraph};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the namespaces graph endpoint, relative to the Kiali base URL
pub const GRAPH_ENDPOINT: &str = "kiali/api/namespaces/graph";

/// Fetches workload graphs from a Kiali instance
#[derive(Debug, Clone)]
pub struct KialiClient {
    client: Client,
    base_url: Url,
}

impl KialiClient {
    /// Create a new client for the Kiali instance at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Self::with_client(base_url, client)
    }

    /// Create a client around an existing HTTP client
    pub fn with_client(base_url: &str, client: Client) -> Result<Self> {
        // Url::join drops the last path segment unless it ends with a slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).context("Invalid Kiali URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the graph request URL for the given namespaces and parameters
    pub fn graph_url(&self, namespaces: &[String], params: &GraphParams) -> Result<Url> {
        let mut url = self
            .base_url
            .join(GRAPH_ENDPOINT)
            .context("Invalid graph endpoint")?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("namespaces", &namespaces.join(","));
            query.append_pair("graphType", "workload");
            for (key, value) in params.query_pairs() {
                query.append_pair(key, value);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl GraphSource for KialiClient {
    async fn fetch_workload_graph(
        &self,
        namespaces: &[String],
        params: &GraphParams,
    ) -> Result<WorkloadGraph> {
        let url = self.graph_url(namespaces, params)?;
        debug!(url = %url, "Fetching workload graph");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send graph request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Kiali error ({}): {}", status, body);
        }

        let snapshot: GraphSnapshot = response
            .json()
            .await
            .context("Failed to parse graph response")?;

        Ok(WorkloadGraph::from(snapshot))
    }
}
