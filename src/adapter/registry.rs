//! Adapter registry: lookup of adapters by platform

use super::traits::{AdapterMetadata, CollectionAdapter};
use super::types::Platform;
use std::sync::Arc;

/// Lookup interface the engine uses to find adapters.
///
/// Hosts with their own plugin loading implement this directly;
/// [`InMemoryAdapterRegistry`] covers the common case.
pub trait AdapterRegistry: Send + Sync {
    /// Metadata of every adapter able to serve `platform`
    fn adapters_for_platform(&self, platform: &Platform) -> Vec<AdapterMetadata>;

    /// Instantiate (or fetch) the adapter identified by name and version
    fn resolve(&self, name: &str, version: &str) -> Option<Arc<dyn CollectionAdapter>>;
}

/// Registry backed by a list of live adapter instances
#[derive(Default)]
pub struct InMemoryAdapterRegistry {
    adapters: Vec<Arc<dyn CollectionAdapter>>,
}

impl InMemoryAdapterRegistry {
    /// Registry with no collectors; every platform is skipped until one is added
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
        }
    }

    /// Add a collector; several may serve the same platform
    pub fn register<A: CollectionAdapter + 'static>(&mut self, adapter: A) {
        self.adapters.push(Arc::new(adapter));
    }

    /// Register an already shared adapter
    pub fn register_shared(&mut self, adapter: Arc<dyn CollectionAdapter>) {
        self.adapters.push(adapter);
    }

    /// How many collectors are registered, across all platforms
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    /// True when no platform can be served
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl AdapterRegistry for InMemoryAdapterRegistry {
    fn adapters_for_platform(&self, platform: &Platform) -> Vec<AdapterMetadata> {
        self.adapters
            .iter()
            .map(|a| a.metadata())
            .filter(|m| &m.platform == platform)
            .cloned()
            .collect()
    }

    fn resolve(&self, name: &str, version: &str) -> Option<Arc<dyn CollectionAdapter>> {
        self.adapters
            .iter()
            .find(|a| {
                let meta = a.metadata();
                meta.name == name && meta.version == version
            })
            .cloned()
    }
}
