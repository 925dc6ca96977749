//! Mesh Scaler CLI
//!
//! One-shot inspection of the mesh the scaler sees, the profiling run that
//! produces queue-length thresholds, and manual replica planning.

mod commands;
mod config;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, plan, profile};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Mesh Scaler CLI
#[derive(Parser)]
#[command(name = "msctl")]
#[command(author, version, about = "CLI for the Mesh Scaler", long_about = None)]
pub struct Cli {
    /// Kiali base URL (can also be set via MSCTL_KIALI_URL env var)
    #[arg(long, env = "MSCTL_KIALI_URL", global = true)]
    pub kiali_url: Option<String>,

    /// Namespace to inspect or scale
    #[arg(long, short, env = "MSCTL_NAMESPACE", global = true)]
    pub namespace: Option<String>,

    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG", global = true)]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show per-workload queue lengths
    Queues {
        /// Observation window of the graph query
        #[arg(long, default_value = "1m")]
        duration: String,
    },

    /// Show end-to-end throughput and ingress request rate
    Throughput {
        /// Observation window of the graph query
        #[arg(long, default_value = "5m")]
        duration: String,
    },

    /// Show current replica counts
    Replicas,

    /// Record maximum queue lengths while the mesh is under load
    Profile {
        /// Profiling time in seconds
        #[arg(long, default_value_t = 600)]
        duration: u64,

        /// Seconds between samples
        #[arg(long, default_value_t = 3)]
        interval: u64,

        /// Where to write the queue-length threshold document
        #[arg(long, short, default_value = "queue.json")]
        output: PathBuf,
    },

    /// Compute the replica plan for the current state of the mesh
    Plan {
        /// Resource and throughput threshold document
        #[arg(long, default_value = "thresholds.json")]
        thresholds: PathBuf,

        /// Queue-length threshold document
        #[arg(long, default_value = "queue.json")]
        queue_thresholds: PathBuf,

        /// Ceiling on any planned replica count
        #[arg(long, default_value_t = 100)]
        max_replicas: u32,

        /// Average pod samples instead of keeping the last pod's
        #[arg(long)]
        mean: bool,

        /// Scale the deployments instead of only printing the plan
        #[arg(long)]
        apply: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = config::Config::load()?;
    let ctx = context::Context::new(
        &settings.kiali_url(cli.kiali_url.as_deref()),
        &settings.namespace(cli.namespace.as_deref()),
        cli.kubeconfig.as_deref(),
    )?;

    match cli.command {
        Commands::Queues { duration } => {
            inspect::show_queue_lengths(&ctx, &duration, cli.format).await?;
        }
        Commands::Throughput { duration } => {
            inspect::show_throughput(&ctx, &duration, cli.format).await?;
        }
        Commands::Replicas => {
            inspect::show_replicas(&ctx, cli.format).await?;
        }
        Commands::Profile {
            duration,
            interval,
            output,
        } => {
            profile::run_profile(&ctx, duration, interval, &output, cli.format).await?;
        }
        Commands::Plan {
            thresholds,
            queue_thresholds,
            max_replicas,
            mean,
            apply,
        } => {
            let options = plan::PlanOptions {
                thresholds,
                queue_thresholds,
                max_replicas,
                mean,
                apply,
            };
            plan::run_plan(&ctx, &options, cli.format).await?;
        }
    }

    Ok(())
}
