//! Read-only views of the mesh

use anyhow::Result;
use colored::Colorize;
use scaler_lib::{ClusterControl, QueueLengths};
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;

use crate::context::Context;
use crate::output::{print_heading, print_info, print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct QueueRow {
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Queue Length")]
    queue_length: String,
}

#[derive(Serialize)]
struct QueueReport<'a> {
    namespace: &'a str,
    per_workload: &'a BTreeMap<String, f64>,
    unknown: f64,
}

fn queue_rows(lengths: &QueueLengths) -> Vec<QueueRow> {
    lengths
        .per_workload
        .iter()
        .map(|(workload, q)| QueueRow {
            workload: workload.clone(),
            queue_length: format!("{:.2}", q),
        })
        .collect()
}

pub async fn show_queue_lengths(ctx: &Context, duration: &str, format: OutputFormat) -> Result<()> {
    let lengths = ctx.graph(duration).await?.queue_lengths();

    match format {
        OutputFormat::Json => print_json(&QueueReport {
            namespace: &ctx.namespace,
            per_workload: &lengths.per_workload,
            unknown: lengths.unknown,
        })?,
        OutputFormat::Table => {
            print_heading(&format!("Queue lengths in {} ({})", ctx.namespace, duration));
            print_table(queue_rows(&lengths));
            println!("\nUnknown aggregate: {:.2}", lengths.unknown);
        }
    }

    Ok(())
}

#[derive(Serialize)]
struct ThroughputReport<'a> {
    namespace: &'a str,
    end_to_end_throughput: i64,
    ingress_request_rate: f64,
}

pub async fn show_throughput(ctx: &Context, duration: &str, format: OutputFormat) -> Result<()> {
    let graph = ctx.graph(duration).await?;
    let report = ThroughputReport {
        namespace: &ctx.namespace,
        end_to_end_throughput: graph.end_to_end_throughput()?,
        ingress_request_rate: graph.ingress_request_rate()?,
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            print_heading(&format!("Throughput in {} ({})", ctx.namespace, duration));
            println!(
                "End-to-end throughput: {}",
                report.end_to_end_throughput.to_string().cyan()
            );
            println!(
                "Ingress request rate:  {}",
                format!("{:.2} req/s", report.ingress_request_rate).cyan()
            );
        }
    }

    Ok(())
}

#[derive(Tabled, Serialize)]
struct ReplicaRow {
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Replicas")]
    replicas: u32,
}

pub async fn show_replicas(ctx: &Context, format: OutputFormat) -> Result<()> {
    let cluster = ctx.cluster().await?;

    let mut rows = Vec::new();
    for deployment in cluster.list_deployment_names(&ctx.namespace).await? {
        let replicas = cluster
            .current_replica_count(&ctx.namespace, &deployment)
            .await?;
        rows.push(ReplicaRow {
            deployment,
            replicas,
        });
    }

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            print_heading(&format!("Replicas in {}", ctx.namespace));
            let total: u32 = rows.iter().map(|r| r.replicas).sum();
            let count = rows.len();
            print_table(rows);
            print_info(&format!("{} deployments, {} replicas", count, total));
        }
    }

    Ok(())
}
