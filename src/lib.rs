//! Convoy: Adapter Orchestration Engine
//!
//! Runs platform collection adapters in parallel under a concurrency bound,
//! per-adapter deadlines and a resource budget, then folds their output into
//! a single deduplicated, cross-platform view.
//!
//! # Core Concepts
//!
//! - **Adapters**: external collaborators that collect from one platform each
//! - **Runs**: one `orchestrate` call, tracked until it finishes
//! - **Aggregation**: transform, merge duplicates, correlate across platforms
//!
//! # Example
//!
//! ```
//! use convoy::{InMemoryAdapterRegistry, OrchestrationConfig, OrchestrationEngine};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(InMemoryAdapterRegistry::new());
//! let engine = OrchestrationEngine::new(OrchestrationConfig::default(), registry).unwrap();
//! assert!(engine.list_active().is_empty());
//! ```

pub mod adapter;
pub mod aggregation;
pub mod orchestration;
pub mod resource;

pub use adapter::{
    AdapterError, AdapterMetadata, AdapterRegistry, Asset, CancellationToken, CollectionAdapter,
    CollectionRequest, CollectionResponse, Credentials, Dependency, InMemoryAdapterRegistry,
    Platform, TransformedData,
};
pub use aggregation::AggregatedPayload;
pub use orchestration::{
    AdapterExecutionResult, AdapterExecutionStatus, EngineError, OrchestrationConfig,
    OrchestrationEngine, OrchestrationResult, OrchestrationStatus,
};
pub use resource::{ResourceMetrics, ResourceSampler, SystemSampler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
