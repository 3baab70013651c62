//! Adapter trait: the contract platform adapters implement
//!
//! An adapter knows how to talk to exactly one kind of source platform.
//! The engine never looks inside the collected payload; it hands it back
//! to the same adapter's `transform_data` for normalization.

use super::cancel::CancellationToken;
use super::types::{
    AdapterError, CollectionRequest, CollectionResponse, Credentials, Platform, TransformedData,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Describes a registered adapter without instantiating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterMetadata {
    pub name: String,
    pub version: String,
    pub platform: Platform,
    /// Capability tags such as "inventory", "dependencies", "metrics"
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl AdapterMetadata {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        platform: impl Into<Platform>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            platform: platform.into(),
            capabilities: BTreeSet::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Ranking used when several adapters serve one platform:
    /// newer version first, then the richer capability set.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        compare_versions(&self.version, &other.version)
            .then_with(|| self.capabilities.len().cmp(&other.capabilities.len()))
    }
}

/// Compare dotted version strings numerically ("1.10.0" > "1.9.3").
///
/// Falls back to plain string comparison when either side has a
/// non-numeric component.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parse(v: &str) -> Option<Vec<u64>> {
        v.trim_start_matches('v')
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect()
    }

    match (parse(a), parse(b)) {
        (Some(mut left), Some(mut right)) => {
            let len = left.len().max(right.len());
            left.resize(len, 0);
            right.resize(len, 0);
            left.cmp(&right)
        }
        _ => a.cmp(b),
    }
}

/// Contract for a platform collection adapter.
///
/// # Example
///
/// ```ignore
/// struct AwsAdapter { metadata: AdapterMetadata }
///
/// #[async_trait]
/// impl CollectionAdapter for AwsAdapter {
///     fn metadata(&self) -> &AdapterMetadata { &self.metadata }
///     async fn validate_credentials(&self, creds: &Credentials) -> bool {
///         creds.contains_key("access_key_id")
///     }
///     async fn validate_configuration(&self, _config: &Value) -> bool { true }
///     async fn test_connectivity(&self, _config: &Value) -> bool { true }
///     async fn collect_data(
///         &self,
///         request: &CollectionRequest,
///         cancel: &CancellationToken,
///     ) -> Result<CollectionResponse, AdapterError> {
///         // call the platform API
///         Ok(CollectionResponse::success(0, Value::Null))
///     }
///     fn transform_data(&self, raw: &Value) -> Result<TransformedData, AdapterError> {
///         Ok(TransformedData::new())
///     }
/// }
/// ```
#[async_trait]
pub trait CollectionAdapter: Send + Sync {
    fn metadata(&self) -> &AdapterMetadata;

    /// Check the supplied credentials. Failing this excludes the adapter from the run.
    async fn validate_credentials(&self, credentials: &Credentials) -> bool;

    /// Check the adapter-specific configuration. Failing this excludes the adapter.
    async fn validate_configuration(&self, configuration: &Value) -> bool;

    /// Probe the platform. Advisory only: a failed probe is logged, not enforced.
    async fn test_connectivity(&self, configuration: &Value) -> bool;

    /// Collect raw data from the platform.
    ///
    /// Long-running adapters should check `cancel` between pages/batches and
    /// return `Err(AdapterError::Cancelled)` once it is set.
    async fn collect_data(
        &self,
        request: &CollectionRequest,
        cancel: &CancellationToken,
    ) -> Result<CollectionResponse, AdapterError>;

    /// Normalize a raw payload produced by `collect_data`.
    fn transform_data(&self, raw: &Value) -> Result<TransformedData, AdapterError>;
}
