//! Cross-platform correlation over deduplicated assets

use super::merger::{meets_threshold, similarity_score};
use super::types::{AssetRef, NetworkCorrelation, ServiceCorrelation};
use crate::adapter::{Asset, Platform};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Relationships found between assets of different platforms
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationReport {
    pub network: Vec<NetworkCorrelation>,
    pub service: Vec<ServiceCorrelation>,
}

/// Finds assets on different platforms that share an address or a service
#[derive(Debug, Clone)]
pub struct CrossPlatformCorrelator {
    confidence_threshold: f64,
}

impl CrossPlatformCorrelator {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn correlate(&self, assets: &[Asset]) -> CorrelationReport {
        let report = CorrelationReport {
            network: self.network_correlations(assets),
            service: service_correlations(assets),
        };
        debug!(
            network = report.network.len(),
            service = report.service.len(),
            "cross-platform correlation finished"
        );
        report
    }

    /// Pairs across distinct platforms sharing a primary IP.
    ///
    /// Each unordered platform pair is visited once, lower platform first.
    fn network_correlations(&self, assets: &[Asset]) -> Vec<NetworkCorrelation> {
        let mut by_platform: BTreeMap<&Platform, Vec<&Asset>> = BTreeMap::new();
        for asset in assets.iter().filter(|a| a.primary_ip().is_some()) {
            by_platform.entry(&asset.platform).or_default().push(asset);
        }

        let groups: Vec<_> = by_platform.into_values().collect();
        let mut found = Vec::new();

        for (i, left) in groups.iter().enumerate() {
            for right in &groups[i + 1..] {
                for a in left {
                    for b in right {
                        let (Some(ip), Some(other)) = (a.primary_ip(), b.primary_ip()) else {
                            continue;
                        };
                        if ip != other {
                            continue;
                        }
                        let confidence = similarity_score(a, b);
                        if !meets_threshold(confidence, self.confidence_threshold) {
                            continue;
                        }
                        found.push(NetworkCorrelation {
                            ip_address: ip.to_string(),
                            source: AssetRef::of(a),
                            target: AssetRef::of(b),
                            confidence,
                        });
                    }
                }
            }
        }

        found
    }
}

/// `(service, port)` keys carried by assets on at least two platforms.
///
/// Service names compare case-insensitively and are reported lowercased.
fn service_correlations(assets: &[Asset]) -> Vec<ServiceCorrelation> {
    let mut by_service: BTreeMap<(String, u16), Vec<&Asset>> = BTreeMap::new();
    for asset in assets {
        let (Some(name), Some(port)) = (asset.service_name.as_deref(), asset.port) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        by_service
            .entry((name.to_ascii_lowercase(), port))
            .or_default()
            .push(asset);
    }

    by_service
        .into_iter()
        .filter_map(|((service_name, port), members)| {
            let platforms: BTreeSet<Platform> =
                members.iter().map(|a| a.platform.clone()).collect();
            if platforms.len() < 2 {
                return None;
            }
            Some(ServiceCorrelation {
                service_name,
                port,
                platforms,
                assets: members.into_iter().map(AssetRef::of).collect(),
            })
        })
        .collect()
}
