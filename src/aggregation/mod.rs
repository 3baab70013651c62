//! Aggregation of collected data into one deduplicated, correlated view
//!
//! - **ResultAggregator**: transforms successful collections and combines them
//! - **AssetMerger**: folds assets that describe the same entity
//! - **CrossPlatformCorrelator**: links assets across platforms by IP or service

mod aggregator;
mod correlator;
mod merger;
mod types;

pub use aggregator::ResultAggregator;
pub use correlator::{CorrelationReport, CrossPlatformCorrelator};
pub use merger::{similarity_score, AssetMerger, MergeOutcome};
pub use types::{
    AggregatedPayload, AggregatedTotals, AssetRef, DuplicateAsset, NetworkCorrelation,
    PlatformSummary, ServiceCorrelation,
};
