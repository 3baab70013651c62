//! Resource monitor: rolling history of samples during a run

use super::sampler::{ResourceMetrics, ResourceSampler};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Oldest samples are dropped beyond this many
const MAX_HISTORY: usize = 1024;

/// Peak/average figures recorded on the run result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageSummary {
    pub sample_count: usize,
    pub peak_memory_mb: f64,
    pub avg_memory_mb: f64,
    pub peak_cpu_percent: f64,
    pub avg_cpu_percent: f64,
    pub min_available_disk_mb: f64,
    pub monitoring_duration_seconds: f64,
}

impl ResourceUsageSummary {
    /// Summarize a series of samples. An empty series yields all zeros.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a ResourceMetrics>) -> Self {
        let mut summary = Self::default();
        let mut memory_total = 0.0;
        let mut cpu_total = 0.0;

        for sample in samples {
            if summary.sample_count == 0 {
                summary.min_available_disk_mb = sample.available_disk_mb;
            }
            summary.sample_count += 1;
            memory_total += sample.memory_usage_mb;
            cpu_total += sample.cpu_usage_percent;
            summary.peak_memory_mb = summary.peak_memory_mb.max(sample.memory_usage_mb);
            summary.peak_cpu_percent = summary.peak_cpu_percent.max(sample.cpu_usage_percent);
            summary.min_available_disk_mb =
                summary.min_available_disk_mb.min(sample.available_disk_mb);
        }

        if summary.sample_count > 0 {
            summary.avg_memory_mb = memory_total / summary.sample_count as f64;
            summary.avg_cpu_percent = cpu_total / summary.sample_count as f64;
        }
        summary
    }
}

/// Samples resources on a fixed interval while active.
///
/// One monitor belongs to one orchestration run.
pub struct ResourceMonitor {
    sampler: Arc<dyn ResourceSampler>,
    interval: Duration,
    history: Arc<Mutex<VecDeque<ResourceMetrics>>>,
    task: Option<JoinHandle<()>>,
    started_at: Option<Instant>,
}

impl ResourceMonitor {
    pub fn new(sampler: Arc<dyn ResourceSampler>, interval: Duration) -> Self {
        Self {
            sampler,
            interval,
            history: Arc::new(Mutex::new(VecDeque::new())),
            task: None,
            started_at: None,
        }
    }

    /// Whether background sampling is running
    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Take a reading on demand. Recorded into the history while active.
    pub async fn sample(&self) -> Option<ResourceMetrics> {
        let metrics = self.sampler.current_metrics().await?;
        if self.is_active() {
            push_sample(&self.history, metrics);
        }
        Some(metrics)
    }

    /// Start background sampling. A second call while active is a no-op.
    pub fn start(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.started_at = Some(Instant::now());

        let sampler = Arc::clone(&self.sampler);
        let history = Arc::clone(&self.history);
        let period = self.interval;
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match sampler.current_metrics().await {
                    Some(metrics) => push_sample(&history, metrics),
                    None => debug!("resource sampler unavailable, skipping sample"),
                }
            }
        }));
        debug!(interval_ms = period.as_millis() as u64, "resource monitoring started");
    }

    /// Stop sampling, take one closing reading and summarize the history.
    ///
    /// A sampler that panics only costs the samples it failed to produce.
    /// Calling this on an inactive monitor summarizes whatever history exists.
    pub async fn stop(&mut self) -> ResourceUsageSummary {
        if let Some(task) = self.task.take() {
            task.abort();
            let sampler = Arc::clone(&self.sampler);
            match tokio::spawn(async move { sampler.current_metrics().await }).await {
                Ok(Some(metrics)) => push_sample(&self.history, metrics),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "closing resource sample failed"),
            }
        }

        let mut summary = {
            let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
            ResourceUsageSummary::from_samples(history.iter())
        };
        summary.monitoring_duration_seconds = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        debug!(
            samples = summary.sample_count,
            peak_memory_mb = summary.peak_memory_mb,
            peak_cpu_percent = summary.peak_cpu_percent,
            "resource monitoring stopped"
        );
        summary
    }

    /// Snapshot of the recorded samples, oldest first
    pub fn history(&self) -> Vec<ResourceMetrics> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn push_sample(history: &Mutex<VecDeque<ResourceMetrics>>, metrics: ResourceMetrics) {
    let mut history = history.lock().unwrap_or_else(PoisonError::into_inner);
    if history.len() == MAX_HISTORY {
        history.pop_front();
    }
    history.push_back(metrics);
}
