//! Queue-length profiling command

use anyhow::{Context as _, Result};
use colored::Colorize;
use scaler_lib::profiler::{ProfilerConfig, QueueLengthProfiler};
use scaler_lib::GraphParams;
use std::path::Path;
use std::time::Duration;
use tabled::Tabled;
use tokio::sync::broadcast;

use crate::context::Context;
use crate::output::{print_info, print_json, print_success, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Max Queue Length")]
    max_queue_length: String,
}

/// Profile until `duration_secs` elapse or Ctrl-C, then write the document
pub async fn run_profile(
    ctx: &Context,
    duration_secs: u64,
    interval_secs: u64,
    output: &Path,
    format: OutputFormat,
) -> Result<()> {
    anyhow::ensure!(interval_secs > 0, "--interval must be positive");

    let config = ProfilerConfig {
        interval: Duration::from_secs(interval_secs),
        duration: Duration::from_secs(duration_secs),
        graph_params: GraphParams::with_duration("1m"),
    };
    let profiler = QueueLengthProfiler::new(ctx.kiali.clone(), vec![ctx.namespace.clone()], config);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    print_info(&format!(
        "Profiling {} for {}s, sampling every {}s (Ctrl-C to stop early)",
        ctx.namespace.cyan(),
        duration_secs,
        interval_secs
    ));

    let thresholds = profiler.run(shutdown_rx).await;

    if thresholds.is_empty() {
        print_warning("No queue lengths recorded, nothing written");
        return Ok(());
    }

    thresholds
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    match format {
        OutputFormat::Json => print_json(&thresholds)?,
        OutputFormat::Table => {
            let rows = thresholds
                .iter()
                .map(|(workload, q)| ThresholdRow {
                    workload: workload.clone(),
                    max_queue_length: format!("{:.2}", q),
                })
                .collect();
            print_table(rows);
        }
    }
    print_success(&format!(
        "Wrote {} queue-length thresholds to {}",
        thresholds.len(),
        output.display()
    ));

    Ok(())
}
