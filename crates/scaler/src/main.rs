//! Mesh Scaler - dependency-aware autoscaler for service-mesh workloads
//!
//! Runs one control loop per namespace: watches mesh telemetry and pod usage,
//! and scales overloaded deployments together with the workloads downstream
//! of them.

use anyhow::{Context, Result};
use scaler_lib::{
    health::HealthRegistry,
    observability::{ScalerMetrics, StructuredLogger},
    ControlLoop, KialiClient, KubeCluster, QueueLengthThresholds, ScalerError, ThresholdConfig,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting mesh-scaler");

    let config = config::ScalerConfig::load()?;
    info!(
        namespace = %config.namespace,
        kiali_url = %config.kiali_url,
        "Scaler configured"
    );

    // Incomplete threshold configuration must never reach the loop
    let thresholds = ThresholdConfig::load(&config.thresholds_path)
        .with_context(|| format!("Failed to load {}", config.thresholds_path.display()))?;
    let queue_thresholds = QueueLengthThresholds::load(&config.queue_thresholds_path)
        .with_context(|| format!("Failed to load {}", config.queue_thresholds_path.display()))?;
    info!(
        deployments = thresholds.resource_thresholds.len(),
        throughput = thresholds.throughput,
        queue_thresholds = queue_thresholds.len(),
        "Thresholds loaded"
    );

    let kiali = Arc::new(KialiClient::new(&config.kiali_url)?);
    let cluster = Arc::new(KubeCluster::try_default().await?);

    let health_registry = HealthRegistry::new();

    let metrics = ScalerMetrics::new();

    let logger = StructuredLogger::new(&config.namespace);
    logger.log_startup(SCALER_VERSION, config.interval_secs);

    let control = ControlLoop::builder()
        .graph_source(kiali)
        .metrics_source(cluster.clone())
        .cluster(cluster)
        .thresholds(Arc::new(thresholds))
        .queue_thresholds(Arc::new(queue_thresholds))
        .namespace(config.namespace.clone())
        .interval(config.interval())
        .graph_params(config.graph_params())
        .aggregation(config.pod_aggregation)
        .limits(config.limits())
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .build()?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, app_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    health_registry.mark_started().await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(control.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.mark_stopping().await;

    let _ = shutdown_tx.send(());
    match loop_handle.await? {
        Ok(()) | Err(ScalerError::Cancelled) => {}
        Err(e) => error!(error = %e, "Control loop failed"),
    }

    info!("Shutdown complete");
    Ok(())
}
