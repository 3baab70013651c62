//! Orchestration of adapter runs
//!
//! A run flows through three stages:
//!
//! 1. [`TaskPreparer`] picks and validates one adapter per platform
//! 2. [`ParallelExecutor`] runs the tasks under a concurrency bound,
//!    deadline and resource budget
//! 3. [`ResultAggregator`](crate::aggregation::ResultAggregator) merges what
//!    succeeded
//!
//! [`OrchestrationEngine`] drives the stages and tracks active runs.

mod config;
mod coordinator;
mod error;
mod executor;
mod preparer;
mod types;

pub use config::{ConfigError, OrchestrationConfig};
pub use coordinator::OrchestrationEngine;
pub use error::{AggregationError, EngineError, EngineResult, ExecutionError, TaskSkip};
pub use executor::ParallelExecutor;
pub use preparer::{AdapterTask, PreparedTasks, TaskPreparer};
pub use types::{
    AdapterExecutionResult, AdapterExecutionStatus, ErrorSummary, OrchestrationResult,
    OrchestrationStatus,
};
