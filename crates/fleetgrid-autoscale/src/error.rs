//! Error types for scaling engines and the scaling service.

use fleetgrid_state::StateError;
use thiserror::Error;

pub type ScalingResult<T> = Result<T, ScalingError>;

#[derive(Debug, Error)]
pub enum ScalingError {
    /// A provider API call failed.
    #[error("{engine}: {operation} failed: {source}")]
    Provider {
        engine: String,
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("worker {0} not found")]
    WorkerNotFound(String),

    #[error(transparent)]
    State(#[from] StateError),
}

impl ScalingError {
    pub fn provider(engine: &str, operation: &'static str, source: anyhow::Error) -> Self {
        ScalingError::Provider {
            engine: engine.to_string(),
            operation,
            source: source.into(),
        }
    }
}
