//! Error types for the scaling engine

use thiserror::Error;

/// Errors raised by the evaluator, propagation engine and control loop.
///
/// Collaborator failures keep the underlying `anyhow` error so the cause chain
/// survives into the logs. The "needs scale" signal is not an error; see
/// [`crate::models::CheckOutcome`].
#[derive(Debug, Error)]
pub enum ScalerError {
    #[error("no unknown/ingress node found in workload graph")]
    NoIngressNode,

    #[error("telemetry backend error: {0}")]
    Graph(#[source] anyhow::Error),

    #[error("metrics API error: {0}")]
    Metrics(#[source] anyhow::Error),

    #[error("cluster API error: {0}")]
    Cluster(#[source] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("control loop cancelled")]
    Cancelled,
}

impl ScalerError {
    /// True for failures of an outbound call that the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScalerError::Graph(_) | ScalerError::Metrics(_) | ScalerError::Cluster(_)
        )
    }
}

pub type ScalerResult<T> = Result<T, ScalerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ScalerError::Graph(anyhow::anyhow!("timeout")).is_transient());
        assert!(ScalerError::Cluster(anyhow::anyhow!("403")).is_transient());
        assert!(!ScalerError::NoIngressNode.is_transient());
        assert!(!ScalerError::Cancelled.is_transient());
    }

    #[test]
    fn test_error_messages_carry_cause() {
        let err = ScalerError::Metrics(anyhow::anyhow!("pod not found"));
        assert_eq!(err.to_string(), "metrics API error: pod not found");
    }
}
