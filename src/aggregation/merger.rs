//! Asset merger: similarity scoring and deduplication
//!
//! Similarity is a plain weighted sum over identity fields. A field that
//! is missing on either side contributes nothing; the score is not
//! renormalized over the fields present.

use super::types::DuplicateAsset;
use crate::adapter::{Asset, MergeInfo};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const IP_WEIGHT: f64 = 0.4;
pub const HOSTNAME_WEIGHT: f64 = 0.3;
pub const MAC_WEIGHT: f64 = 0.2;
pub const UNIQUE_ID_WEIGHT: f64 = 0.1;

/// Pairwise comparison is quadratic; beyond this many assets it gets noticeable
const LARGE_BATCH_WARNING: usize = 5000;

/// Absorbs rounding in the weighted sum (0.4 + 0.3 + 0.2 < 0.9 in f64)
const SCORE_TOLERANCE: f64 = 1e-9;

/// Whether `score` reaches `threshold`
pub(crate) fn meets_threshold(score: f64, threshold: f64) -> bool {
    score + SCORE_TOLERANCE >= threshold
}

/// Weighted similarity of two assets, in `[0, 1]`
pub fn similarity_score(a: &Asset, b: &Asset) -> f64 {
    let mut score = 0.0;

    if let (Some(ip_a), Some(ip_b)) = (a.primary_ip(), b.primary_ip()) {
        if ip_a == ip_b {
            score += IP_WEIGHT;
        }
    }
    if let (Some(host_a), Some(host_b)) = (non_empty(&a.hostname), non_empty(&b.hostname)) {
        if host_a.eq_ignore_ascii_case(host_b) {
            score += HOSTNAME_WEIGHT;
        }
    }
    if let (Some(mac_a), Some(mac_b)) = (non_empty(&a.mac_address), non_empty(&b.mac_address)) {
        if mac_a == mac_b {
            score += MAC_WEIGHT;
        }
    }
    if let (Some(id_a), Some(id_b)) = (
        non_empty(&a.unique_identifier),
        non_empty(&b.unique_identifier),
    ) {
        if id_a == id_b {
            score += UNIQUE_ID_WEIGHT;
        }
    }

    score
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

/// Assets after deduplication plus the records that were folded away
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub assets: Vec<Asset>,
    pub duplicates: Vec<DuplicateAsset>,
}

/// Merges assets describing the same real-world entity
#[derive(Debug, Clone)]
pub struct AssetMerger {
    threshold: f64,
}

impl AssetMerger {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether two assets clear the similarity threshold
    pub fn is_same_entity(&self, a: &Asset, b: &Asset) -> bool {
        meets_threshold(similarity_score(a, b), self.threshold)
    }

    /// Deduplicate `assets`.
    ///
    /// Walks assets in order. Each asset not yet absorbed becomes a base and
    /// absorbs every later unabsorbed asset that matches it. The base keeps
    /// its own fields, filling gaps from the absorbed members.
    pub fn merge(&self, assets: Vec<Asset>) -> MergeOutcome {
        if assets.len() > LARGE_BATCH_WARNING {
            warn!(
                assets = assets.len(),
                "large deduplication batch; consider bucketing by IP before pairwise comparison"
            );
        }

        let mut slots: Vec<Option<Asset>> = assets.into_iter().map(Some).collect();
        let mut outcome = MergeOutcome::default();

        for i in 0..slots.len() {
            let Some(base) = slots[i].take() else {
                continue;
            };

            let mut members = Vec::new();
            for slot in slots.iter_mut().skip(i + 1) {
                let score = match slot.as_ref() {
                    Some(candidate) => similarity_score(&base, candidate),
                    None => continue,
                };
                if meets_threshold(score, self.threshold) {
                    if let Some(member) = slot.take() {
                        members.push((member, score));
                    }
                }
            }

            if members.is_empty() {
                outcome.assets.push(base);
                continue;
            }

            debug!(
                asset = %base.id,
                platform = %base.platform,
                absorbed = members.len(),
                "merging duplicate assets"
            );
            let merged = Self::fold(base, &members);
            for (member, score) in members {
                outcome.duplicates.push(DuplicateAsset {
                    asset: member,
                    merged_into: merged.id.clone(),
                    merged_into_platform: merged.platform.clone(),
                    similarity: score,
                });
            }
            outcome.assets.push(merged);
        }

        outcome
    }

    fn fold(mut base: Asset, members: &[(Asset, f64)]) -> Asset {
        let mut platforms = BTreeSet::new();
        let mut platform_data = BTreeMap::new();
        let mut platform_metrics = BTreeMap::new();

        platforms.insert(base.platform.clone());
        platform_data.insert(base.platform.clone(), base.raw_data.clone());
        platform_metrics.insert(base.platform.clone(), base.performance_metrics.clone());

        let mut confidence: f64 = 1.0;
        for (member, score) in members {
            confidence = confidence.min(*score);
            platforms.insert(member.platform.clone());
            platform_data
                .entry(member.platform.clone())
                .or_insert_with(|| member.raw_data.clone());
            platform_metrics
                .entry(member.platform.clone())
                .or_insert_with(|| member.performance_metrics.clone());

            fill_gap(&mut base.ip_address, &member.ip_address);
            fill_gap(&mut base.private_ip, &member.private_ip);
            fill_gap(&mut base.hostname, &member.hostname);
            fill_gap(&mut base.mac_address, &member.mac_address);
            fill_gap(&mut base.unique_identifier, &member.unique_identifier);
            fill_gap(&mut base.service_name, &member.service_name);
            if base.port.is_none() {
                base.port = member.port;
            }
        }

        base.merge_info = Some(MergeInfo {
            merged_from_platforms: platforms,
            original_asset_count: members.len() + 1,
            platform_data,
            platform_metrics,
            merge_confidence: confidence,
        });
        base
    }
}

fn fill_gap(target: &mut Option<String>, source: &Option<String>) {
    if target.as_deref().map_or(true, str::is_empty) {
        if let Some(value) = source.as_ref().filter(|v| !v.is_empty()) {
            *target = Some(value.clone());
        }
    }
}
