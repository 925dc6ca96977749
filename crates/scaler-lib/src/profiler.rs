//! Queue-length profiling
//!
//! Run while the mesh is under representative load. The maximum queue length
//! seen per workload becomes that workload's queue-length threshold.

use crate::graph::{GraphParams, GraphSource, QueueLengths};
use crate::thresholds::QueueLengthThresholds;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for a profiling run
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// Time between samples (default: 3 seconds)
    pub interval: Duration,
    /// Total run time (default: 10 minutes)
    pub duration: Duration,
    pub graph_params: GraphParams,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            duration: Duration::from_secs(600),
            graph_params: GraphParams::with_duration("1m"),
        }
    }
}

/// Running maximum of queue lengths per workload
#[derive(Debug, Clone, Default)]
pub struct QueueLengthMaxima {
    maxima: BTreeMap<String, f64>,
    samples: usize,
}

impl QueueLengthMaxima {
    pub fn record(&mut self, lengths: &QueueLengths) {
        for (workload, &length) in &lengths.per_workload {
            self.maxima
                .entry(workload.clone())
                .and_modify(|max| *max = max.max(length))
                .or_insert(length);
        }
        self.samples += 1;
    }

    /// Graph snapshots recorded so far
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn to_thresholds(&self) -> QueueLengthThresholds {
        self.maxima.iter().map(|(w, q)| (w.clone(), *q)).collect()
    }
}

/// Samples the workload graph and keeps per-workload maxima
pub struct QueueLengthProfiler {
    graphs: Arc<dyn GraphSource>,
    namespaces: Vec<String>,
    config: ProfilerConfig,
}

impl QueueLengthProfiler {
    pub fn new(graphs: Arc<dyn GraphSource>, namespaces: Vec<String>, config: ProfilerConfig) -> Self {
        Self {
            graphs,
            namespaces,
            config,
        }
    }

    /// Sample until the configured duration elapses or `shutdown` fires.
    ///
    /// A failed fetch skips that sample. The maxima collected so far are
    /// returned either way.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> QueueLengthThresholds {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            duration_secs = self.config.duration.as_secs(),
            "Starting queue-length profiling"
        );

        let deadline = Instant::now() + self.config.duration;
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut maxima = QueueLengthMaxima::default();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    self.sample(&mut maxima).await;
                }
                _ = tokio::time::sleep_until(deadline) => break,
                _ = shutdown.recv() => {
                    info!("Profiling interrupted");
                    break;
                }
            }
        }

        info!(
            samples = maxima.samples(),
            workloads = maxima.maxima.len(),
            "Queue-length profiling finished"
        );
        maxima.to_thresholds()
    }

    async fn sample(&self, maxima: &mut QueueLengthMaxima) {
        match self
            .graphs
            .fetch_workload_graph(&self.namespaces, &self.config.graph_params)
            .await
        {
            Ok(graph) => {
                let lengths = graph.queue_lengths();
                debug!(queue_lengths = ?lengths.per_workload, "Queue-length sample");
                maxima.record(&lengths);
            }
            Err(e) => warn!(error = %e, "Failed to fetch graph, skipping sample"),
        }
    }
}
