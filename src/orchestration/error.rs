//! Error taxonomy for orchestration runs
//!
//! None of these escape `orchestrate()`: each is caught where it happens
//! and recorded on the result as a status plus error text.

use crate::adapter::{AdapterError, Platform};
use thiserror::Error;

/// Why a platform was left out of a run during task preparation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskSkip {
    #[error("no adapter registered for platform '{0}'")]
    NoAdapter(Platform),

    #[error("adapter {name} v{version} could not be resolved")]
    AdapterUnresolved { name: String, version: String },

    #[error("credential validation failed for adapter {0}")]
    InvalidCredentials(String),

    #[error("configuration validation failed for adapter {0}")]
    InvalidConfiguration(String),

    #[error("validation of adapter {name} panicked: {reason}")]
    ValidationPanicked { name: String, reason: String },
}

/// Failure of a single adapter task
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("adapter timed out after {0} seconds")]
    Timeout(f64),

    #[error("{0}")]
    Adapter(#[from] AdapterError),

    #[error("resource limits exceeded: {0}")]
    ResourceBudget(String),

    #[error("run cancelled before adapter started")]
    Cancelled,

    #[error("adapter task panicked: {0}")]
    Panicked(String),
}

/// Failure while building the aggregated payload
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("transform failed for platform '{platform}': {source}")]
    Transform {
        platform: Platform,
        #[source]
        source: AdapterError,
    },

    #[error("aggregation panicked: {0}")]
    Panicked(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine construction or unexpected run-level failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    InvalidConfig(#[from] crate::orchestration::config::ConfigError),

    #[error("orchestration failed: {0}")]
    Fatal(String),
}

impl EngineError {
    /// Short type tag used in error summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Fatal(_) => "OrchestrationFatalFailure",
        }
    }
}

/// Render a panic payload as text
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Describe why a spawned task did not hand back its output
pub(crate) fn join_failure(error: tokio::task::JoinError) -> String {
    if error.is_panic() {
        panic_message(error.into_panic().as_ref())
    } else {
        error.to_string()
    }
}
