//! Common test utilities for orchestration integration tests
//!
//! Provides scriptable adapters, fixed and crashing resource samplers, and
//! helpers for building engines and request maps.

#![allow(dead_code)]

pub mod mock_adapter;

pub use mock_adapter::{ConcurrencyProbe, MockAdapter, Outcome};

use async_trait::async_trait;
use convoy::{
    CollectionRequest, InMemoryAdapterRegistry, OrchestrationConfig, OrchestrationEngine,
    Platform, ResourceMetrics, ResourceSampler,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Sampler returning the same reading every time
pub struct FixedSampler(pub Option<ResourceMetrics>);

impl FixedSampler {
    pub fn healthy() -> Arc<Self> {
        Arc::new(Self(Some(ResourceMetrics::new(256.0, 10.0, 100_000.0))))
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self(None))
    }

    pub fn reading(memory_mb: f64, cpu_percent: f64, disk_mb: f64) -> Arc<Self> {
        Arc::new(Self(Some(ResourceMetrics::new(memory_mb, cpu_percent, disk_mb))))
    }
}

#[async_trait]
impl ResourceSampler for FixedSampler {
    async fn current_metrics(&self) -> Option<ResourceMetrics> {
        self.0
    }
}

/// Sampler whose every reading panics
pub struct PanickingSampler;

#[async_trait]
impl ResourceSampler for PanickingSampler {
    async fn current_metrics(&self) -> Option<ResourceMetrics> {
        panic!("metrics backend crashed");
    }
}

/// Test defaults: short deadline, no background monitoring
pub fn test_config() -> OrchestrationConfig {
    OrchestrationConfig::default()
        .with_adapter_timeout(Duration::from_secs(5))
        .with_resource_monitoring(false)
}

pub fn engine_with(
    config: OrchestrationConfig,
    sampler: Arc<dyn ResourceSampler>,
    adapters: Vec<MockAdapter>,
) -> Arc<OrchestrationEngine> {
    let mut registry = InMemoryAdapterRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    let engine = OrchestrationEngine::with_sampler(config, Arc::new(registry), sampler)
        .expect("test config should be valid");
    Arc::new(engine)
}

pub fn engine(config: OrchestrationConfig, adapters: Vec<MockAdapter>) -> Arc<OrchestrationEngine> {
    engine_with(config, FixedSampler::healthy(), adapters)
}

pub fn requests(platforms: &[&str]) -> BTreeMap<Platform, CollectionRequest> {
    platforms
        .iter()
        .map(|p| {
            let request = CollectionRequest::new(*p).with_credential("token", "test-token");
            (Platform::new(*p), request)
        })
        .collect()
}

/// Route engine logs to the test harness; safe to call repeatedly
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
