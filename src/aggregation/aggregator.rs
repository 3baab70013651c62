//! Result aggregation: fold successful collections into one payload

use super::correlator::CrossPlatformCorrelator;
use super::merger::AssetMerger;
use super::types::{AggregatedPayload, AggregatedTotals, PlatformSummary};
use crate::adapter::CollectionAdapter;
use crate::orchestration::{AdapterExecutionResult, AggregationError, OrchestrationConfig};
use tracing::{debug, info};

/// Builds the aggregated payload of a run
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    merger: Option<AssetMerger>,
    correlator: Option<CrossPlatformCorrelator>,
}

impl ResultAggregator {
    pub fn new(merger: Option<AssetMerger>, correlator: Option<CrossPlatformCorrelator>) -> Self {
        Self { merger, correlator }
    }

    /// Aggregator wired from config.
    ///
    /// Correlation only runs on deduplicated data, so it needs both flags.
    pub fn from_config(config: &OrchestrationConfig) -> Self {
        let merger = config
            .enable_deduplication
            .then(|| AssetMerger::new(config.asset_similarity_threshold));
        let correlator = (config.enable_deduplication && config.enable_cross_platform_correlation)
            .then(|| CrossPlatformCorrelator::new(config.correlation_confidence_threshold));
        Self::new(merger, correlator)
    }

    /// Transform and combine every successful result.
    ///
    /// Unsuccessful results are ignored. Any transform error aborts the whole
    /// aggregation.
    pub fn aggregate<'a, A, I>(&self, collections: I) -> Result<AggregatedPayload, AggregationError>
    where
        A: CollectionAdapter + ?Sized + 'a,
        I: IntoIterator<Item = (&'a A, &'a AdapterExecutionResult)>,
    {
        let mut payload = AggregatedPayload::new();
        let mut assets = Vec::new();

        for (adapter, result) in collections {
            if !result.is_success() {
                continue;
            }
            let Some(response) = result.response.as_ref() else {
                continue;
            };

            let mut transformed =
                adapter
                    .transform_data(&response.data)
                    .map_err(|source| AggregationError::Transform {
                        platform: result.platform.clone(),
                        source,
                    })?;

            for asset in &mut transformed.assets {
                asset.platform = result.platform.clone();
            }
            for dependency in &mut transformed.dependencies {
                dependency.platform = result.platform.clone();
            }

            debug!(
                platform = %result.platform,
                assets = transformed.assets.len(),
                dependencies = transformed.dependencies.len(),
                "transformed collection"
            );

            payload.platform_summaries.insert(
                result.platform.clone(),
                PlatformSummary {
                    platform: result.platform.clone(),
                    adapter_name: result.adapter_name.clone(),
                    adapter_version: result.adapter_version.clone(),
                    collection_method: response.collection_method.clone(),
                    resource_count: response.resource_count,
                    asset_count: transformed.assets.len(),
                    dependency_count: transformed.dependencies.len(),
                    duration_seconds: result.duration_seconds,
                },
            );
            payload.platforms.push(result.platform.clone());
            payload
                .performance_metrics
                .insert(result.platform.clone(), transformed.performance_metrics);
            payload.dependencies.extend(transformed.dependencies);
            assets.extend(transformed.assets);
        }

        let total_resources = assets.len();
        match &self.merger {
            Some(merger) => {
                let outcome = merger.merge(assets);
                payload.assets = outcome.assets;
                payload.duplicates = outcome.duplicates;
            }
            None => payload.assets = assets,
        }

        if let Some(correlator) = &self.correlator {
            let report = correlator.correlate(&payload.assets);
            payload.network_correlations = report.network;
            payload.service_correlations = report.service;
        }

        payload.totals = AggregatedTotals {
            total_resources,
            unique_resources: payload.assets.len(),
            duplicate_resources: payload.duplicates.len(),
            total_dependencies: payload.dependencies.len(),
        };

        info!(
            platforms = payload.platforms.len(),
            total = payload.totals.total_resources,
            unique = payload.totals.unique_resources,
            duplicates = payload.totals.duplicate_resources,
            "aggregation complete"
        );

        Ok(payload)
    }
}
