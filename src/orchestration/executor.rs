//! Parallel execution of prepared adapter tasks
//!
//! Every task is spawned immediately and then waits on the admission gate,
//! a semaphore sized to `max_parallel_adapters`. Cancelling the run releases
//! queued tasks straight away. Once admitted, a task runs
//! the resource-budget check and then calls the adapter under a hard
//! deadline. Failures stay inside their own task.

use super::config::OrchestrationConfig;
use super::error::{join_failure, ExecutionError};
use super::preparer::AdapterTask;
use super::types::{AdapterExecutionResult, AdapterExecutionStatus};
use crate::adapter::{AdapterError, CancellationToken, CollectionResponse};
use crate::resource::ResourceSampler;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Runs adapter tasks under bounded concurrency
pub struct ParallelExecutor {
    gate: Arc<Semaphore>,
    sampler: Arc<dyn ResourceSampler>,
    config: Arc<OrchestrationConfig>,
}

impl ParallelExecutor {
    pub fn new(config: Arc<OrchestrationConfig>, sampler: Arc<dyn ResourceSampler>) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(config.max_parallel_adapters)),
            sampler,
            config,
        }
    }

    /// Permits currently free on the admission gate
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    /// Run all tasks and wait for every one of them to settle.
    ///
    /// The returned results are in submission order, whatever order the
    /// tasks finished in.
    pub async fn execute(
        &self,
        tasks: Vec<AdapterTask>,
        cancel: &CancellationToken,
    ) -> Vec<AdapterExecutionResult> {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let placeholder = AdapterExecutionResult::pending(
                    task.metadata.name.clone(),
                    task.metadata.version.clone(),
                    task.platform.clone(),
                );
                let runner = TaskRunner {
                    gate: Arc::clone(&self.gate),
                    sampler: Arc::clone(&self.sampler),
                    config: Arc::clone(&self.config),
                    cancel: cancel.clone(),
                };
                (placeholder, tokio::spawn(runner.run(task)))
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (mut placeholder, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    let reason = join_failure(join_error);
                    warn!(
                        platform = %placeholder.platform,
                        adapter = %placeholder.adapter_name,
                        %reason,
                        "adapter task panicked"
                    );
                    placeholder.error = Some(ExecutionError::Panicked(reason).to_string());
                    placeholder.mark_finished(AdapterExecutionStatus::Failed);
                    results.push(placeholder);
                }
            }
        }
        results
    }
}

/// Everything one spawned task needs, owned so the task can be `'static`
struct TaskRunner {
    gate: Arc<Semaphore>,
    sampler: Arc<dyn ResourceSampler>,
    config: Arc<OrchestrationConfig>,
    cancel: CancellationToken,
}

/// How one attempt ended, before retry policy is applied
enum AttemptOutcome {
    Succeeded(CollectionResponse),
    Unsuccessful(CollectionResponse),
    Errored(ExecutionError),
}

impl TaskRunner {
    async fn run(self, task: AdapterTask) -> AdapterExecutionResult {
        let mut result = AdapterExecutionResult::pending(
            task.metadata.name.clone(),
            task.metadata.version.clone(),
            task.platform.clone(),
        );

        let admitted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = self.gate.acquire() => Some(permit),
        };
        let _permit = match admitted {
            Some(Ok(permit)) => permit,
            Some(Err(e)) => {
                result.mark_started();
                result.error = Some(format!("admission gate closed: {}", e));
                result.mark_finished(AdapterExecutionStatus::Failed);
                return result;
            }
            None => {
                result.mark_started();
                result.error = Some(ExecutionError::Cancelled.to_string());
                result.mark_finished(AdapterExecutionStatus::Cancelled);
                return result;
            }
        };

        result.mark_started();
        if self.cancel.is_cancelled() {
            result.error = Some(ExecutionError::Cancelled.to_string());
            result.mark_finished(AdapterExecutionStatus::Cancelled);
            return result;
        }

        info!(platform = %task.platform, adapter = %task.metadata.name, "adapter started");
        let max_attempts = self.config.max_attempts();

        loop {
            result.attempts += 1;
            let (status, retryable) = match self.attempt(&task).await {
                AttemptOutcome::Succeeded(response) => {
                    result.resource_count = response.resource_count;
                    result.response = Some(response);
                    result.error = None;
                    result.mark_finished(AdapterExecutionStatus::Completed);
                    info!(
                        platform = %task.platform,
                        adapter = %task.metadata.name,
                        resources = result.resource_count,
                        attempts = result.attempts,
                        "adapter completed"
                    );
                    return result;
                }
                AttemptOutcome::Unsuccessful(response) => {
                    result.resource_count = response.resource_count;
                    result.error = Some(
                        response
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "adapter reported an unsuccessful collection".into()),
                    );
                    result.response = Some(response);
                    (AdapterExecutionStatus::Completed, true)
                }
                AttemptOutcome::Errored(error) => {
                    let outcome = match &error {
                        ExecutionError::Timeout(_) => (AdapterExecutionStatus::Timeout, true),
                        ExecutionError::Adapter(AdapterError::Cancelled)
                        | ExecutionError::Cancelled => (AdapterExecutionStatus::Cancelled, false),
                        ExecutionError::Adapter(_) => (AdapterExecutionStatus::Failed, true),
                        ExecutionError::ResourceBudget(_) | ExecutionError::Panicked(_) => {
                            (AdapterExecutionStatus::Failed, false)
                        }
                    };
                    result.error = Some(error.to_string());
                    outcome
                }
            };

            if !retryable || result.attempts >= max_attempts || self.cancel.is_cancelled() {
                warn!(
                    platform = %task.platform,
                    adapter = %task.metadata.name,
                    status = ?status,
                    attempts = result.attempts,
                    error = result.error.as_deref().unwrap_or_default(),
                    "adapter did not succeed"
                );
                result.mark_finished(status);
                return result;
            }

            let delay = self.config.retry_delay(result.attempts);
            warn!(
                platform = %task.platform,
                adapter = %task.metadata.name,
                attempt = result.attempts,
                delay_ms = delay.as_millis() as u64,
                "retrying adapter"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, task: &AdapterTask) -> AttemptOutcome {
        if let Err(refusal) = self.check_resources().await {
            return AttemptOutcome::Errored(refusal);
        }

        let deadline = self.config.adapter_timeout();
        match tokio::time::timeout(deadline, task.adapter.collect_data(&task.request, &self.cancel))
            .await
        {
            Ok(Ok(response)) if response.success => AttemptOutcome::Succeeded(response),
            Ok(Ok(response)) => AttemptOutcome::Unsuccessful(response),
            Ok(Err(e)) => AttemptOutcome::Errored(e.into()),
            Err(_) => AttemptOutcome::Errored(ExecutionError::Timeout(
                self.config.adapter_timeout_seconds,
            )),
        }
    }

    /// Pre-flight budget check. An unavailable sampler allows the task.
    async fn check_resources(&self) -> Result<(), ExecutionError> {
        let Some(metrics) = self.sampler.current_metrics().await else {
            debug!("resource sampler unavailable, allowing task");
            return Ok(());
        };

        if metrics.memory_usage_mb > self.config.max_memory_usage_mb {
            return Err(ExecutionError::ResourceBudget(format!(
                "memory usage {:.0}MB above limit {:.0}MB",
                metrics.memory_usage_mb, self.config.max_memory_usage_mb
            )));
        }
        if metrics.available_disk_mb < self.config.min_disk_space_mb {
            return Err(ExecutionError::ResourceBudget(format!(
                "free disk {:.0}MB below minimum {:.0}MB",
                metrics.available_disk_mb, self.config.min_disk_space_mb
            )));
        }
        if metrics.cpu_usage_percent > self.config.max_cpu_usage_percent {
            // Soft limit: back off briefly, then run anyway
            warn!(
                cpu_percent = metrics.cpu_usage_percent,
                limit = self.config.max_cpu_usage_percent,
                "cpu above limit, throttling"
            );
            tokio::time::sleep(self.config.cpu_throttle_pause()).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{
        AdapterMetadata, CollectionAdapter, CollectionRequest, Credentials, Platform,
        TransformedData,
    };
    use crate::resource::ResourceMetrics;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    enum Behavior {
        Succeed,
        Sleep(Duration),
        Error,
        Report,
        FailTimes(u32),
        Panic,
    }

    struct ScriptedAdapter {
        metadata: AdapterMetadata,
        behavior: Behavior,
        calls: AtomicU32,
    }

    impl ScriptedAdapter {
        fn new(platform: &str, behavior: Behavior) -> Self {
            Self {
                metadata: AdapterMetadata::new(format!("{}-adapter", platform), "1.0.0", platform),
                behavior,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CollectionAdapter for ScriptedAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }
        async fn validate_credentials(&self, _credentials: &Credentials) -> bool {
            true
        }
        async fn validate_configuration(&self, _configuration: &Value) -> bool {
            true
        }
        async fn test_connectivity(&self, _configuration: &Value) -> bool {
            true
        }
        async fn collect_data(
            &self,
            _request: &CollectionRequest,
            _cancel: &CancellationToken,
        ) -> Result<CollectionResponse, AdapterError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match &self.behavior {
                Behavior::Succeed => Ok(CollectionResponse::success(3, Value::Null)),
                Behavior::Sleep(d) => {
                    tokio::time::sleep(*d).await;
                    Ok(CollectionResponse::success(1, Value::Null))
                }
                Behavior::Error => Err(AdapterError::Connection("connection refused".into())),
                Behavior::Report => Ok(CollectionResponse::failure("quota exhausted")),
                Behavior::FailTimes(n) if call <= *n => {
                    Err(AdapterError::Collection(format!("flaky call {}", call)))
                }
                Behavior::FailTimes(_) => Ok(CollectionResponse::success(2, Value::Null)),
                Behavior::Panic => panic!("adapter exploded"),
            }
        }
        fn transform_data(&self, _raw: &Value) -> Result<TransformedData, AdapterError> {
            Ok(TransformedData::new())
        }
    }

    struct FixedSampler(Option<ResourceMetrics>);

    #[async_trait]
    impl ResourceSampler for FixedSampler {
        async fn current_metrics(&self) -> Option<ResourceMetrics> {
            self.0
        }
    }

    fn healthy() -> Arc<dyn ResourceSampler> {
        Arc::new(FixedSampler(Some(ResourceMetrics::new(100.0, 10.0, 50_000.0))))
    }

    fn task(adapter: ScriptedAdapter) -> AdapterTask {
        let metadata = adapter.metadata.clone();
        let platform = metadata.platform.clone();
        AdapterTask {
            adapter: Arc::new(adapter),
            request: CollectionRequest::new(platform.clone()),
            metadata,
            platform,
        }
    }

    fn executor(config: OrchestrationConfig, sampler: Arc<dyn ResourceSampler>) -> ParallelExecutor {
        ParallelExecutor::new(Arc::new(config), sampler)
    }

    #[tokio::test]
    async fn test_results_follow_submission_order() {
        let exec = executor(OrchestrationConfig::default(), healthy());
        let tasks = vec![
            task(ScriptedAdapter::new("slow", Behavior::Sleep(Duration::from_millis(80)))),
            task(ScriptedAdapter::new("fast", Behavior::Succeed)),
        ];

        let results = exec.execute(tasks, &CancellationToken::new()).await;

        assert_eq!(results[0].platform, Platform::new("slow"));
        assert_eq!(results[1].platform, Platform::new("fast"));
        assert!(results.iter().all(|r| r.is_success()));
        assert_eq!(results[1].resource_count, 3);
        assert_eq!(exec.available_slots(), 5);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_not_raised() {
        let config = OrchestrationConfig::default().with_adapter_timeout(Duration::from_millis(50));
        let exec = executor(config, healthy());
        let tasks = vec![task(ScriptedAdapter::new(
            "hung",
            Behavior::Sleep(Duration::from_secs(30)),
        ))];

        let results = exec.execute(tasks, &CancellationToken::new()).await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Timeout);
        assert!(results[0].error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_adapter_error_and_unsuccessful_response() {
        let exec = executor(OrchestrationConfig::default(), healthy());
        let tasks = vec![
            task(ScriptedAdapter::new("broken", Behavior::Error)),
            task(ScriptedAdapter::new("quota", Behavior::Report)),
        ];

        let results = exec.execute(tasks, &CancellationToken::new()).await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert_eq!(
            results[0].error.as_deref(),
            Some("Connection error: connection refused")
        );
        assert_eq!(results[1].status, AdapterExecutionStatus::Completed);
        assert!(!results[1].is_success());
        assert_eq!(results[1].error.as_deref(), Some("quota exhausted"));
    }

    #[tokio::test]
    async fn test_panicking_adapter_is_isolated() {
        let exec = executor(OrchestrationConfig::default(), healthy());
        let tasks = vec![
            task(ScriptedAdapter::new("bomb", Behavior::Panic)),
            task(ScriptedAdapter::new("fine", Behavior::Succeed)),
        ];

        let results = exec.execute(tasks, &CancellationToken::new()).await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("adapter exploded"));
        assert!(results[1].is_success());
    }

    #[tokio::test]
    async fn test_memory_ceiling_refuses_task() {
        let sampler = Arc::new(FixedSampler(Some(ResourceMetrics::new(4096.0, 10.0, 50_000.0))));
        let exec = executor(OrchestrationConfig::default(), sampler);
        let adapter = ScriptedAdapter::new("aws", Behavior::Succeed);

        let results = exec.execute(vec![task(adapter)], &CancellationToken::new()).await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert!(results[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("resource limits exceeded"));
        assert!(results[0].response.is_none());
    }

    #[tokio::test]
    async fn test_low_disk_refuses_task() {
        let sampler = Arc::new(FixedSampler(Some(ResourceMetrics::new(100.0, 10.0, 10.0))));
        let exec = executor(OrchestrationConfig::default(), sampler);

        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("aws", Behavior::Succeed))],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("free disk"));
    }

    #[tokio::test]
    async fn test_high_cpu_throttles_but_runs() {
        let sampler = Arc::new(FixedSampler(Some(ResourceMetrics::new(100.0, 99.0, 50_000.0))));
        let config =
            OrchestrationConfig::default().with_cpu_throttle_pause(Duration::from_millis(40));
        let exec = executor(config, sampler);

        let started = Instant::now();
        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("aws", Behavior::Succeed))],
                &CancellationToken::new(),
            )
            .await;

        assert!(results[0].is_success());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_unavailable_sampler_fails_open() {
        let exec = executor(OrchestrationConfig::default(), Arc::new(FixedSampler(None)));
        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("aws", Behavior::Succeed))],
                &CancellationToken::new(),
            )
            .await;
        assert!(results[0].is_success());
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let config = OrchestrationConfig::default().with_retry(3, Duration::from_millis(5));
        let exec = executor(config, healthy());

        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("flaky", Behavior::FailTimes(2)))],
                &CancellationToken::new(),
            )
            .await;

        assert!(results[0].is_success());
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].error.is_none());
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_budget() {
        let config = OrchestrationConfig::default().with_retry(1, Duration::from_millis(5));
        let exec = executor(config, healthy());

        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("flaky", Behavior::FailTimes(5)))],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert_eq!(results[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let exec = executor(OrchestrationConfig::default(), healthy());
        let results = exec
            .execute(
                vec![task(ScriptedAdapter::new("flaky", Behavior::FailTimes(1)))],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Failed);
        assert_eq!(results[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_unstarted_tasks() {
        let exec = executor(OrchestrationConfig::default(), healthy());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = exec
            .execute(vec![task(ScriptedAdapter::new("aws", Behavior::Succeed))], &cancel)
            .await;

        assert_eq!(results[0].status, AdapterExecutionStatus::Cancelled);
        assert_eq!(results[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_cancel_releases_queued_task() {
        let config = OrchestrationConfig::default().with_max_parallel_adapters(1);
        let exec = Arc::new(executor(config, healthy()));
        let cancel = CancellationToken::new();

        let running = tokio::spawn({
            let exec = Arc::clone(&exec);
            let cancel = cancel.clone();
            async move {
                let tasks = vec![
                    task(ScriptedAdapter::new("hog", Behavior::Sleep(Duration::from_millis(400)))),
                    task(ScriptedAdapter::new("queued", Behavior::Succeed)),
                ];
                exec.execute(tasks, &cancel).await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let results = running.await.unwrap();
        // The running adapter ignores the signal and finishes its page
        assert!(results[0].is_success());
        assert_eq!(results[1].status, AdapterExecutionStatus::Cancelled);
        assert_eq!(results[1].attempts, 0);
        assert!(results[1].end_time < results[0].end_time);
    }
}
