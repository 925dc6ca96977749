//! Manual replica planning

use anyhow::{Context as _, Result};
use colored::Colorize;
use scaler_lib::{
    ClusterControl, ControlLoop, CyclePlan, PodAggregation, QueueLengthThresholds, ScalingLimits,
    ThresholdConfig,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

use crate::context::Context;
use crate::output::{
    format_bytes, format_change, format_cpu, print_error, print_heading, print_info, print_json,
    print_success, print_table, OutputFormat,
};

pub struct PlanOptions {
    pub thresholds: PathBuf,
    pub queue_thresholds: PathBuf,
    pub max_replicas: u32,
    pub mean: bool,
    pub apply: bool,
}

#[derive(Tabled)]
struct BaseRow {
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "Deployment")]
    deployment: String,
    #[tabled(rename = "Replicas")]
    change: String,
}

#[derive(Serialize)]
struct PlanReport<'a> {
    #[serde(flatten)]
    plan: &'a CyclePlan,
    applied: bool,
    failed: &'a [String],
}

pub async fn run_plan(ctx: &Context, options: &PlanOptions, format: OutputFormat) -> Result<()> {
    anyhow::ensure!(options.max_replicas > 0, "--max-replicas must be positive");

    let thresholds = ThresholdConfig::load(&options.thresholds)
        .with_context(|| format!("Failed to load {}", options.thresholds.display()))?;
    let queue_thresholds = QueueLengthThresholds::load(&options.queue_thresholds)
        .with_context(|| format!("Failed to load {}", options.queue_thresholds.display()))?;

    let cluster = ctx.cluster().await?;
    let aggregation = if options.mean {
        PodAggregation::Mean
    } else {
        PodAggregation::LastPod
    };

    let control = ControlLoop::builder()
        .graph_source(ctx.kiali.clone())
        .metrics_source(cluster.clone())
        .cluster(cluster.clone())
        .thresholds(Arc::new(thresholds))
        .queue_thresholds(Arc::new(queue_thresholds))
        .namespace(ctx.namespace.clone())
        .aggregation(aggregation)
        .limits(ScalingLimits {
            max_replicas: options.max_replicas,
        })
        .build()?;

    let cycle = control.plan_once().await?;

    // Read before applying so the table shows the change
    let mut current = BTreeMap::new();
    for deployment in cycle.plan.keys() {
        let replicas = cluster
            .current_replica_count(&ctx.namespace, deployment)
            .await?;
        current.insert(deployment.clone(), replicas);
    }

    let failed = if options.apply && !cycle.plan.is_empty() {
        control.apply_plan(&cycle.plan).await
    } else {
        Vec::new()
    };

    match format {
        OutputFormat::Json => {
            print_json(&PlanReport {
                plan: &cycle,
                applied: options.apply,
                failed: &failed,
            })?;
        }
        OutputFormat::Table => print_plan_table(ctx, &cycle, &current, options.apply, &failed),
    }

    Ok(())
}

fn print_plan_table(
    ctx: &Context,
    cycle: &CyclePlan,
    current: &BTreeMap<String, u32>,
    applied: bool,
    failed: &[String],
) {
    print_heading(&format!("Replica plan for {}", ctx.namespace));

    if cycle.base.is_empty() {
        print_info("No deployment is over its resource thresholds");
        return;
    }

    println!("{}", "Base deployments".bold());
    print_table(
        cycle
            .base
            .iter()
            .map(|(deployment, sample)| BaseRow {
                deployment: deployment.clone(),
                cpu: format_cpu(sample.cpu),
                memory: format_bytes(sample.memory),
            })
            .collect(),
    );

    println!("\n{}", "Planned replicas".bold());
    print_table(
        cycle
            .plan
            .iter()
            .map(|(deployment, &target)| PlanRow {
                deployment: deployment.clone(),
                change: format_change(current.get(deployment).copied().unwrap_or(0), target),
            })
            .collect(),
    );

    if !applied {
        print_info("Dry run, rerun with --apply to scale");
        return;
    }

    for deployment in failed {
        print_error(&format!("Failed to scale {}", deployment));
    }
    let scaled = cycle.plan.len() - failed.len();
    if scaled > 0 {
        print_success(&format!("Scaled {} deployments", scaled));
    }
}
