//! Health of the scaler's collaborators and of its control loop
//!
//! The control loop feeds every cycle result into a [`HealthRegistry`]; the
//! daemon reads it back on `/healthz` and `/readyz`. The component set is
//! fixed, so a registry starts out with all of them healthy.

use crate::control::CycleReport;
use crate::error::{ScalerError, ScalerResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parts of the scaler whose health is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// Telemetry backend serving the workload graph
    GraphSource,
    /// Pod metrics API
    MetricsSource,
    /// Cluster API used for listing and scaling
    Cluster,
    ControlLoop,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::GraphSource,
        Component::MetricsSource,
        Component::Cluster,
        Component::ControlLoop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Component::GraphSource => "graph_source",
            Component::MetricsSource => "metrics_source",
            Component::Cluster => "cluster",
            Component::ControlLoop => "control_loop",
        }
    }

    /// Collaborator behind an aborted cycle, if the error names one
    pub fn at_fault(error: &ScalerError) -> Option<Self> {
        match error {
            ScalerError::Graph(_) | ScalerError::NoIngressNode => Some(Component::GraphSource),
            ScalerError::Metrics(_) => Some(Component::MetricsSource),
            ScalerError::Cluster(_) => Some(Component::Cluster),
            _ => None,
        }
    }
}

/// Ordered from best to worst, so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component entered its current status
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn healthy(now: DateTime<Utc>) -> Self {
        Self {
            status: ComponentStatus::Healthy,
            message: None,
            since: now,
        }
    }

    fn set(&mut self, status: ComponentStatus, message: Option<String>, now: DateTime<Utc>) {
        if self.status != status {
            self.since = now;
        }
        self.status = status;
        self.message = message;
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
    /// Aborted cycles since the last one that completed
    pub consecutive_aborts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<DateTime<Utc>>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct State {
    components: BTreeMap<Component, ComponentHealth>,
    started: bool,
    stopping: bool,
    consecutive_aborts: u32,
    last_cycle: Option<DateTime<Utc>>,
}

impl State {
    fn set(&mut self, component: Component, status: ComponentStatus, message: Option<String>) {
        let now = Utc::now();
        self.components
            .entry(component)
            .or_insert_with(|| ComponentHealth::healthy(now))
            .set(status, message, now);
    }

    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|h| h.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared, cloneable view of scaler health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<State>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        let now = Utc::now();
        let components = Component::ALL
            .into_iter()
            .map(|c| (c, ComponentHealth::healthy(now)))
            .collect();

        Self {
            state: Arc::new(RwLock::new(State {
                components,
                started: false,
                stopping: false,
                consecutive_aborts: 0,
                last_cycle: None,
            })),
        }
    }

    /// Fold one control-loop cycle into component health.
    ///
    /// A completed cycle clears every component, except that failed scale
    /// calls leave the cluster degraded. An aborted cycle degrades the loop
    /// and the collaborator the error points at.
    pub async fn record_cycle(&self, result: &ScalerResult<CycleReport>) {
        let mut state = self.state.write().await;
        if state.stopping {
            return;
        }
        state.last_cycle = Some(Utc::now());

        match result {
            Ok(report) => {
                state.consecutive_aborts = 0;
                for component in Component::ALL {
                    state.set(component, ComponentStatus::Healthy, None);
                }
                if let CycleReport::Triggered(summary) = report {
                    if !summary.failed.is_empty() {
                        state.set(
                            Component::Cluster,
                            ComponentStatus::Degraded,
                            Some(format!("failed to scale {}", summary.failed.join(", "))),
                        );
                    }
                }
            }
            Err(e) => {
                state.consecutive_aborts += 1;
                if let Some(component) = Component::at_fault(e) {
                    state.set(component, ComponentStatus::Degraded, Some(e.to_string()));
                }
                state.set(
                    Component::ControlLoop,
                    ComponentStatus::Degraded,
                    Some(format!("cycle aborted: {}", e)),
                );
            }
        }
    }

    /// The loop is running and the API can report ready
    pub async fn mark_started(&self) {
        self.state.write().await.started = true;
    }

    /// Shutdown began; never ready again
    pub async fn mark_stopping(&self) {
        let mut state = self.state.write().await;
        state.stopping = true;
        state.set(
            Component::ControlLoop,
            ComponentStatus::Unhealthy,
            Some("shutting down".to_string()),
        );
    }

    pub async fn status(&self, component: Component) -> ComponentStatus {
        let state = self.state.read().await;
        state
            .components
            .get(&component)
            .map(|h| h.status)
            .unwrap_or(ComponentStatus::Healthy)
    }

    pub async fn report(&self) -> HealthReport {
        let state = self.state.read().await;
        HealthReport {
            status: state.overall(),
            components: state.components.clone(),
            consecutive_aborts: state.consecutive_aborts,
            last_cycle: state.last_cycle,
        }
    }

    pub async fn readiness(&self) -> Readiness {
        let state = self.state.read().await;

        let reason = if state.stopping {
            Some("shutting down".to_string())
        } else if !state.started {
            Some("control loop not started".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, h)| h.status == ComponentStatus::Unhealthy)
                .map(|(c, _)| format!("{} unhealthy", c.name()))
        };

        Readiness {
            ready: reason.is_none(),
            reason,
        }
    }
}
