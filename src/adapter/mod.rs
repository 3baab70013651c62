//! Collection adapter boundary
//!
//! Adapters are external collaborators: each one knows how to collect data
//! from a single source platform. This module defines the contract the
//! engine relies on and the registry it uses to find adapters.

mod cancel;
mod registry;
mod traits;
mod types;

pub use cancel::CancellationToken;
pub use registry::{AdapterRegistry, InMemoryAdapterRegistry};
pub use traits::{compare_versions, AdapterMetadata, CollectionAdapter};
pub use types::{
    AdapterError, Asset, CollectionRequest, CollectionResponse, Credentials, Dependency,
    MergeInfo, Platform, TransformedData,
};
