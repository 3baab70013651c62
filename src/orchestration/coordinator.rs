//! Orchestration engine: drives one run end to end
//!
//! A run moves through preparation, parallel execution and aggregation while
//! an optional resource monitor samples in the background. Every outcome,
//! including internal faults, ends up on the returned [`OrchestrationResult`].

use super::config::OrchestrationConfig;
use super::error::{join_failure, panic_message, AggregationError, EngineError, EngineResult};
use super::executor::ParallelExecutor;
use super::preparer::{PreparedTasks, TaskPreparer};
use super::types::{
    AdapterExecutionResult, ErrorSummary, OrchestrationResult, OrchestrationStatus,
};
use crate::adapter::{
    AdapterRegistry, CancellationToken, CollectionAdapter, CollectionRequest, Platform,
};
use crate::aggregation::{AggregatedPayload, ResultAggregator};
use crate::resource::{ResourceMonitor, ResourceSampler, SystemSampler};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bookkeeping for a run that has not finished yet
struct ActiveRun {
    result: OrchestrationResult,
    cancel: CancellationToken,
}

/// Keeps a run registered until it settles.
///
/// Dropping an unreleased guard means the caller abandoned the run: it is
/// deregistered and its cancellation signal tripped so queued and
/// cooperating tasks stop.
struct RunGuard<'a> {
    active: &'a DashMap<String, ActiveRun>,
    run_id: String,
    armed: bool,
}

impl RunGuard<'_> {
    /// Deregister the run and hand back its bookkeeping
    fn release(mut self) -> Option<ActiveRun> {
        self.armed = false;
        self.active.remove(&self.run_id).map(|(_, run)| run)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Some((_, run)) = self.active.remove(&self.run_id) {
            run.cancel.cancel();
            warn!(run_id = %self.run_id, "orchestration abandoned before completion");
        }
    }
}

/// What a run produced before its final status is decided
struct RunOutcome {
    adapter_results: Vec<AdapterExecutionResult>,
    aggregated: Option<AggregatedPayload>,
    skipped: Vec<Platform>,
}

/// Coordinates adapter runs across platforms
pub struct OrchestrationEngine {
    config: Arc<OrchestrationConfig>,
    preparer: TaskPreparer,
    executor: ParallelExecutor,
    aggregator: ResultAggregator,
    sampler: Arc<dyn ResourceSampler>,
    active: DashMap<String, ActiveRun>,
}

impl OrchestrationEngine {
    /// Engine sampling the host it runs on
    pub fn new(
        config: OrchestrationConfig,
        registry: Arc<dyn AdapterRegistry>,
    ) -> EngineResult<Self> {
        Self::with_sampler(config, registry, Arc::new(SystemSampler::new()))
    }

    /// Engine reading resource metrics from `sampler`
    pub fn with_sampler(
        config: OrchestrationConfig,
        registry: Arc<dyn AdapterRegistry>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let config = Arc::new(config);

        Ok(Self {
            preparer: TaskPreparer::new(registry),
            executor: ParallelExecutor::new(Arc::clone(&config), Arc::clone(&sampler)),
            aggregator: ResultAggregator::from_config(&config),
            sampler,
            active: DashMap::new(),
            config,
        })
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Run every platform request to completion.
    ///
    /// Never fails: adapter failures, aggregation failures and internal
    /// faults are all reported through the returned result. Dropping the
    /// future abandons the run, which deregisters and cancels it.
    pub async fn orchestrate(
        &self,
        requests: BTreeMap<Platform, CollectionRequest>,
        run_id: Option<String>,
    ) -> OrchestrationResult {
        let cancel = CancellationToken::new();
        let run_id = self.register(run_id, cancel.clone());
        let guard = RunGuard {
            active: &self.active,
            run_id: run_id.clone(),
            armed: true,
        };
        info!(run_id = %run_id, platforms = requests.len(), "orchestration started");

        let mut monitor = self.config.enable_resource_monitoring.then(|| {
            let mut monitor =
                ResourceMonitor::new(Arc::clone(&self.sampler), self.config.sample_interval());
            monitor.start();
            monitor
        });

        let outcome = self.drive(&run_id, requests, &cancel).await;

        let resource_usage = match monitor.as_mut() {
            Some(monitor) => Some(monitor.stop().await),
            None => None,
        };

        let mut result = guard
            .release()
            .map(|run| run.result)
            .unwrap_or_else(|| OrchestrationResult::running(run_id.clone()));
        result.resource_usage = resource_usage;

        let status = match outcome {
            Ok(outcome) => Self::settle(&mut result, outcome),
            Err(err) => {
                error!(run_id = %run_id, error = %err, "orchestration failed");
                result.error_summary = Some(ErrorSummary::new(err.kind(), err.to_string()));
                OrchestrationStatus::Failed
            }
        };
        result.finish(status);

        info!(
            run_id = %run_id,
            status = ?result.status,
            successful = result.successful_adapters,
            failed = result.failed_adapters,
            duration_seconds = result.duration_seconds.unwrap_or_default(),
            "orchestration finished"
        );
        result
    }

    /// Snapshot of an in-flight run; `None` once it has finished
    pub fn status(&self, run_id: &str) -> Option<OrchestrationResult> {
        self.active.get(run_id).map(|run| run.result.clone())
    }

    /// Request cancellation of a running run.
    ///
    /// Returns false for unknown runs and for runs no longer RUNNING.
    pub fn cancel(&self, run_id: &str) -> bool {
        let Some(mut run) = self.active.get_mut(run_id) else {
            return false;
        };
        if run.result.status != OrchestrationStatus::Running {
            return false;
        }
        run.result.status = OrchestrationStatus::Cancelled;
        run.cancel.cancel();
        info!(run_id = %run_id, "orchestration cancelled");
        true
    }

    /// Ids of runs still in flight
    pub fn list_active(&self) -> Vec<String> {
        self.active.iter().map(|run| run.key().clone()).collect()
    }

    fn register(&self, requested: Option<String>, cancel: CancellationToken) -> String {
        let mut run_id = requested.unwrap_or_else(new_run_id);
        loop {
            match self.active.entry(run_id.clone()) {
                Entry::Occupied(_) => {
                    let fresh = new_run_id();
                    warn!(requested = %run_id, assigned = %fresh, "run id already active");
                    run_id = fresh;
                }
                Entry::Vacant(slot) => {
                    slot.insert(ActiveRun {
                        result: OrchestrationResult::running(run_id.clone()),
                        cancel,
                    });
                    return run_id;
                }
            }
        }
    }

    async fn drive(
        &self,
        run_id: &str,
        requests: BTreeMap<Platform, CollectionRequest>,
        cancel: &CancellationToken,
    ) -> EngineResult<RunOutcome> {
        // Registry faults surface here as a fatal run failure
        let preparer = self.preparer.clone();
        let PreparedTasks { tasks, skipped } = tokio::spawn(async move {
            preparer.prepare(requests).await
        })
        .await
        .map_err(|e| EngineError::Fatal(format!("task preparation panicked: {}", join_failure(e))))?;
        let skipped: Vec<Platform> = skipped.into_iter().map(|(platform, _)| platform).collect();

        if tasks.is_empty() {
            return Ok(RunOutcome {
                adapter_results: Vec::new(),
                aggregated: None,
                skipped,
            });
        }

        if let Some(mut run) = self.active.get_mut(run_id) {
            run.result.total_adapters = tasks.len();
        }
        info!(run_id = %run_id, tasks = tasks.len(), skipped = skipped.len(), "executing adapters");

        let adapters: Vec<Arc<dyn CollectionAdapter>> =
            tasks.iter().map(|task| Arc::clone(&task.adapter)).collect();
        let adapter_results = self.executor.execute(tasks, cancel).await;

        let aggregated = adapter_results
            .iter()
            .any(AdapterExecutionResult::is_success)
            .then(|| self.aggregate(run_id, &adapters, &adapter_results));

        Ok(RunOutcome {
            adapter_results,
            aggregated,
            skipped,
        })
    }

    /// Aggregate, turning errors and panics into a degraded payload
    fn aggregate(
        &self,
        run_id: &str,
        adapters: &[Arc<dyn CollectionAdapter>],
        results: &[AdapterExecutionResult],
    ) -> AggregatedPayload {
        let collections = adapters
            .iter()
            .zip(results)
            .map(|(adapter, result)| (&**adapter, result));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.aggregator.aggregate(collections)))
            .unwrap_or_else(|payload| {
                Err(AggregationError::Panicked(panic_message(payload.as_ref())))
            });

        outcome.unwrap_or_else(|err| {
            warn!(run_id = %run_id, error = %err, "aggregation failed");
            AggregatedPayload::from_error(err.to_string())
        })
    }

    /// Record the outcome on `result` and decide the final status
    fn settle(result: &mut OrchestrationResult, outcome: RunOutcome) -> OrchestrationStatus {
        let cancelled = result.status == OrchestrationStatus::Cancelled;
        result.record_adapter_results(outcome.adapter_results);
        result.aggregated_data = outcome.aggregated;

        if result.total_adapters == 0 {
            let mut summary = ErrorSummary::new(
                "NoValidAdapters",
                "no valid adapters available for the requested platforms",
            );
            summary.failed_platforms = outcome.skipped;
            result.error_summary = Some(summary);
            return if cancelled {
                OrchestrationStatus::Cancelled
            } else {
                OrchestrationStatus::Failed
            };
        }

        let status = if cancelled {
            OrchestrationStatus::Cancelled
        } else {
            OrchestrationStatus::from_counts(result.successful_adapters, result.failed_adapters)
        };

        if status != OrchestrationStatus::Completed {
            let (error_type, message) = if cancelled {
                ("Cancelled", "orchestration was cancelled".to_string())
            } else {
                (
                    "AdapterFailures",
                    format!(
                        "{} of {} adapters failed",
                        result.failed_adapters, result.total_adapters
                    ),
                )
            };
            let mut summary = ErrorSummary::new(error_type, message);
            summary.failed_platforms = result.failed_platforms();
            summary.failed_platforms.extend(outcome.skipped);
            result.error_summary = Some(summary);
        }

        status
    }
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}
