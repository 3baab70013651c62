//! Run and task result types

use crate::adapter::{CollectionResponse, Platform};
use crate::aggregation::AggregatedPayload;
use crate::resource::ResourceUsageSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationStatus {
    Pending,
    Running,
    Completed,
    PartialSuccess,
    Failed,
    Cancelled,
}

impl OrchestrationStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartialSuccess | Self::Failed | Self::Cancelled
        )
    }

    /// Final status from adapter counts
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        if successful == 0 {
            Self::Failed
        } else if failed == 0 {
            Self::Completed
        } else {
            Self::PartialSuccess
        }
    }
}

/// Lifecycle of one adapter task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdapterExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

/// Outcome of running one adapter against one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterExecutionResult {
    pub adapter_name: String,
    pub adapter_version: String,
    pub platform: Platform,
    pub status: AdapterExecutionStatus,
    pub response: Option<CollectionResponse>,
    pub error: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub resource_count: usize,
    /// Attempts made, including retries
    pub attempts: u32,
}

impl AdapterExecutionResult {
    pub fn pending(
        adapter_name: impl Into<String>,
        adapter_version: impl Into<String>,
        platform: Platform,
    ) -> Self {
        Self {
            adapter_name: adapter_name.into(),
            adapter_version: adapter_version.into(),
            platform,
            status: AdapterExecutionStatus::Pending,
            response: None,
            error: None,
            start_time: None,
            end_time: None,
            duration_seconds: None,
            resource_count: 0,
            attempts: 0,
        }
    }

    /// Completed with a response whose own success flag is set
    pub fn is_success(&self) -> bool {
        self.status == AdapterExecutionStatus::Completed
            && self.response.as_ref().is_some_and(|r| r.success)
    }

    pub(crate) fn mark_started(&mut self) {
        self.status = AdapterExecutionStatus::Running;
        self.start_time = Some(Utc::now());
    }

    pub(crate) fn mark_finished(&mut self, status: AdapterExecutionStatus) {
        let end = Utc::now();
        self.status = status;
        self.duration_seconds = self
            .start_time
            .map(|start| (end - start).num_milliseconds() as f64 / 1000.0);
        self.end_time = Some(end);
    }
}

/// Structured description of why a run did not fully succeed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_platforms: Vec<Platform>,
}

impl ErrorSummary {
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            failed_platforms: Vec::new(),
        }
    }
}

/// The value object describing one orchestration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub orchestration_id: String,
    pub status: OrchestrationStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub adapter_results: Vec<AdapterExecutionResult>,
    pub successful_adapters: usize,
    pub failed_adapters: usize,
    pub total_adapters: usize,
    pub aggregated_data: Option<AggregatedPayload>,
    pub resource_usage: Option<ResourceUsageSummary>,
    pub error_summary: Option<ErrorSummary>,
}

impl OrchestrationResult {
    /// A freshly registered run
    pub fn running(orchestration_id: impl Into<String>) -> Self {
        Self {
            orchestration_id: orchestration_id.into(),
            status: OrchestrationStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: None,
            adapter_results: Vec::new(),
            successful_adapters: 0,
            failed_adapters: 0,
            total_adapters: 0,
            aggregated_data: None,
            resource_usage: None,
            error_summary: None,
        }
    }

    /// Store per-adapter results and recompute the counts
    pub(crate) fn record_adapter_results(&mut self, results: Vec<AdapterExecutionResult>) {
        self.total_adapters = results.len();
        self.successful_adapters = results.iter().filter(|r| r.is_success()).count();
        self.failed_adapters = self.total_adapters - self.successful_adapters;
        self.adapter_results = results;
    }

    /// Platforms whose adapter did not succeed
    pub fn failed_platforms(&self) -> Vec<Platform> {
        self.adapter_results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.platform.clone())
            .collect()
    }

    pub(crate) fn finish(&mut self, status: OrchestrationStatus) {
        let end = Utc::now();
        self.status = status;
        self.duration_seconds = Some((end - self.start_time).num_milliseconds() as f64 / 1000.0);
        self.end_time = Some(end);
    }
}
