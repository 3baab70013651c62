//! Types for the aggregated, platform-neutral view of a run

use crate::adapter::{Asset, Dependency, Platform};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// What one platform contributed to the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformSummary {
    pub platform: Platform,
    pub adapter_name: String,
    pub adapter_version: String,
    pub collection_method: String,
    /// Resource count as reported by the adapter
    pub resource_count: usize,
    /// Assets produced by `transform_data`, before deduplication
    pub asset_count: usize,
    pub dependency_count: usize,
    pub duration_seconds: Option<f64>,
}

/// An asset folded into another during deduplication, kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateAsset {
    pub asset: Asset,
    /// Id of the surviving record
    pub merged_into: String,
    pub merged_into_platform: Platform,
    /// Similarity score against the surviving record
    pub similarity: f64,
}

/// Reference to an asset by platform and id
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub platform: Platform,
    pub asset_id: String,
}

impl AssetRef {
    pub fn of(asset: &Asset) -> Self {
        Self {
            platform: asset.platform.clone(),
            asset_id: asset.id.clone(),
        }
    }
}

/// Two assets on different platforms sharing a primary IP address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCorrelation {
    pub ip_address: String,
    pub source: AssetRef,
    pub target: AssetRef,
    /// Similarity score of the pair
    pub confidence: f64,
}

impl NetworkCorrelation {
    pub fn platforms(&self) -> (&Platform, &Platform) {
        (&self.source.platform, &self.target.platform)
    }

    pub fn asset_ids(&self) -> (&str, &str) {
        (self.source.asset_id.as_str(), self.target.asset_id.as_str())
    }
}

/// A `(service, port)` pair observed on more than one platform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCorrelation {
    pub service_name: String,
    pub port: u16,
    pub platforms: BTreeSet<Platform>,
    pub assets: Vec<AssetRef>,
}

impl ServiceCorrelation {
    pub fn asset_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.assets.iter().map(|a| a.asset_id.as_str())
    }
}

/// Counts over the combined asset list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedTotals {
    /// Assets before deduplication
    pub total_resources: usize,
    pub unique_resources: usize,
    pub duplicate_resources: usize,
    pub total_dependencies: usize,
}

/// The canonical result of a run, merged across all successful adapters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPayload {
    pub platforms: Vec<Platform>,
    pub platform_summaries: BTreeMap<Platform, PlatformSummary>,
    pub assets: Vec<Asset>,
    pub dependencies: Vec<Dependency>,
    pub performance_metrics: BTreeMap<Platform, Map<String, Value>>,
    pub duplicates: Vec<DuplicateAsset>,
    pub network_correlations: Vec<NetworkCorrelation>,
    pub service_correlations: Vec<ServiceCorrelation>,
    pub totals: AggregatedTotals,
    /// Set when aggregation failed; everything else is then empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation_error: Option<String>,
}

impl AggregatedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Degraded payload recording why aggregation failed
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            aggregation_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.aggregation_error.is_some()
    }
}
