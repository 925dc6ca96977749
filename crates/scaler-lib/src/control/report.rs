//! Cycle results

use crate::models::{BaseDeployments, ReplicaPlan};
use serde::Serialize;

/// Outcome of one control-loop cycle that did not abort
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// Both checks passed, nothing was scaled
    NoViolation,
    /// A check signalled and the scaling branch ran
    Triggered(ScaleSummary),
}

impl CycleReport {
    pub fn outcome(&self) -> &'static str {
        match self {
            CycleReport::NoViolation => "no_violation",
            CycleReport::Triggered(_) => "scaled",
        }
    }
}

/// What the scaling branch of a cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleSummary {
    pub throughput_violation: bool,
    pub resource_violation: bool,
    pub base: BaseDeployments,
    pub plan: ReplicaPlan,
    /// Deployments whose scale call failed
    pub failed: Vec<String>,
}

impl ScaleSummary {
    /// Number of deployments actually scaled
    pub fn applied(&self) -> usize {
        self.plan.len() - self.failed.len()
    }
}

/// Replica plan computed without applying it
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CyclePlan {
    pub base: BaseDeployments,
    pub plan: ReplicaPlan,
}
