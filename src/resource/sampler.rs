//! Resource sampling: OS-level readings of memory, CPU and disk
//!
//! The sampler is a seam: hosts can plug in their own implementation.
//! `None` from `current_metrics` means "unavailable", which callers treat
//! as permissive.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

/// A single resource reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Resident memory of this process in MB
    pub memory_usage_mb: f64,
    /// Host CPU utilisation since the previous sample, 0–100
    pub cpu_usage_percent: f64,
    /// Free space on the monitored filesystem in MB
    pub available_disk_mb: f64,
    pub sampled_at: DateTime<Utc>,
}

impl ResourceMetrics {
    pub fn new(memory_usage_mb: f64, cpu_usage_percent: f64, available_disk_mb: f64) -> Self {
        Self {
            memory_usage_mb,
            cpu_usage_percent,
            available_disk_mb,
            sampled_at: Utc::now(),
        }
    }
}

/// Source of resource readings
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Take a reading now. Returns `None` when sampling is unavailable.
    async fn current_metrics(&self) -> Option<ResourceMetrics>;
}

/// Cumulative CPU jiffies from the aggregate `cpu` line of /proc/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    total: u64,
    idle: u64,
}

/// Sampler backed by procfs and `df`
///
/// Works on Linux. On other systems the procfs reads fail and every
/// sample is `None`.
pub struct SystemSampler {
    disk_path: PathBuf,
    previous_cpu: Mutex<Option<CpuTimes>>,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    /// Sample free disk space on the root filesystem
    pub fn new() -> Self {
        Self::for_path("/")
    }

    /// Sample free disk space on the filesystem containing `path`
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            disk_path: path.into(),
            previous_cpu: Mutex::new(None),
        }
    }

    async fn memory_usage_mb() -> Option<f64> {
        let status = tokio::fs::read_to_string("/proc/self/status").await.ok()?;
        parse_vm_rss_kb(&status).map(|kb| kb as f64 / 1024.0)
    }

    /// Utilisation since the previous call; the first call reports 0.
    async fn cpu_usage_percent(&self) -> Option<f64> {
        let stat = tokio::fs::read_to_string("/proc/stat").await.ok()?;
        let current = parse_cpu_times(&stat)?;
        let mut previous = self
            .previous_cpu
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let usage = match *previous {
            Some(prev) => cpu_percent_between(prev, current),
            None => 0.0,
        };
        *previous = Some(current);
        Some(usage)
    }

    async fn available_disk_mb(&self) -> Option<f64> {
        let output = tokio::process::Command::new("df")
            .arg("-Pk")
            .arg(&self.disk_path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_df_available_kb(&stdout).map(|kb| kb as f64 / 1024.0)
    }
}

#[async_trait]
impl ResourceSampler for SystemSampler {
    async fn current_metrics(&self) -> Option<ResourceMetrics> {
        let memory = Self::memory_usage_mb().await?;
        let cpu = self.cpu_usage_percent().await?;
        let disk = self.available_disk_mb().await?;
        Some(ResourceMetrics::new(memory, cpu, disk))
    }
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|v| v.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        total: fields.iter().sum(),
        idle,
    })
}

fn cpu_percent_between(prev: CpuTimes, current: CpuTimes) -> f64 {
    let total = current.total.saturating_sub(prev.total);
    if total == 0 {
        return 0.0;
    }
    let idle = current.idle.saturating_sub(prev.idle);
    (total.saturating_sub(idle) as f64 / total as f64) * 100.0
}

fn parse_df_available_kb(output: &str) -> Option<u64> {
    // POSIX format: Filesystem 1024-blocks Used Available Capacity Mounted-on
    output
        .lines()
        .nth(1)
        .and_then(|line| line.split_whitespace().nth(3))
        .and_then(|kb| kb.parse().ok())
}
