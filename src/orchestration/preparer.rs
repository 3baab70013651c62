//! Task preparation: pick and validate one adapter per platform

use super::error::{join_failure, TaskSkip};
use crate::adapter::{AdapterMetadata, AdapterRegistry, CollectionAdapter, CollectionRequest, Platform};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A validated adapter paired with the request it will run
#[derive(Clone)]
pub struct AdapterTask {
    pub adapter: Arc<dyn CollectionAdapter>,
    pub metadata: AdapterMetadata,
    pub request: CollectionRequest,
    pub platform: Platform,
}

impl std::fmt::Debug for AdapterTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterTask")
            .field("adapter", &self.metadata.name)
            .field("version", &self.metadata.version)
            .field("platform", &self.platform)
            .finish()
    }
}

/// Output of preparation: runnable tasks plus the platforms left out
#[derive(Debug, Default)]
pub struct PreparedTasks {
    pub tasks: Vec<AdapterTask>,
    pub skipped: Vec<(Platform, TaskSkip)>,
}

/// Selects the best adapter per platform and validates it
#[derive(Clone)]
pub struct TaskPreparer {
    registry: Arc<dyn AdapterRegistry>,
}

impl TaskPreparer {
    pub fn new(registry: Arc<dyn AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Build tasks for every platform that has a usable adapter.
    ///
    /// Platforms without one are skipped, never failed. Task order follows
    /// the platform order of `requests`.
    pub async fn prepare(&self, requests: BTreeMap<Platform, CollectionRequest>) -> PreparedTasks {
        let mut prepared = PreparedTasks::default();

        for (platform, mut request) in requests {
            request.platform = platform.clone();
            match self.prepare_one(&platform, request).await {
                Ok(task) => {
                    debug!(
                        platform = %platform,
                        adapter = %task.metadata.name,
                        version = %task.metadata.version,
                        "prepared adapter task"
                    );
                    prepared.tasks.push(task);
                }
                Err(skip) => {
                    warn!(platform = %platform, reason = %skip, "skipping platform");
                    prepared.skipped.push((platform, skip));
                }
            }
        }

        prepared
    }

    async fn prepare_one(
        &self,
        platform: &Platform,
        request: CollectionRequest,
    ) -> Result<AdapterTask, TaskSkip> {
        let metadata = self
            .select_adapter(platform)
            .ok_or_else(|| TaskSkip::NoAdapter(platform.clone()))?;

        let adapter = self
            .registry
            .resolve(&metadata.name, &metadata.version)
            .ok_or_else(|| TaskSkip::AdapterUnresolved {
                name: metadata.name.clone(),
                version: metadata.version.clone(),
            })?;

        let checks = tokio::spawn(run_checks(
            Arc::clone(&adapter),
            request,
            platform.clone(),
            metadata.name.clone(),
        ));
        let request = match checks.await {
            Ok(checked) => checked?,
            Err(e) => {
                return Err(TaskSkip::ValidationPanicked {
                    name: metadata.name,
                    reason: join_failure(e),
                })
            }
        };

        Ok(AdapterTask {
            adapter,
            metadata,
            request,
            platform: platform.clone(),
        })
    }

    /// Highest version wins, then the larger capability set
    fn select_adapter(&self, platform: &Platform) -> Option<AdapterMetadata> {
        self.registry
            .adapters_for_platform(platform)
            .into_iter()
            .max_by(|a, b| a.rank_cmp(b))
    }
}

/// Adapter-supplied validation hooks, run in their own task per platform
async fn run_checks(
    adapter: Arc<dyn CollectionAdapter>,
    request: CollectionRequest,
    platform: Platform,
    name: String,
) -> Result<CollectionRequest, TaskSkip> {
    if !adapter.validate_credentials(&request.credentials).await {
        return Err(TaskSkip::InvalidCredentials(name));
    }
    if !adapter.validate_configuration(&request.configuration).await {
        return Err(TaskSkip::InvalidConfiguration(name));
    }
    // Advisory: transient network trouble should not exclude the platform
    if !adapter.test_connectivity(&request.configuration).await {
        warn!(
            platform = %platform,
            adapter = %name,
            "connectivity probe failed, continuing"
        );
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{
        AdapterError, CancellationToken, CollectionResponse, Credentials, InMemoryAdapterRegistry,
        TransformedData,
    };
    use async_trait::async_trait;
    use serde_json::Value;

    struct CheckingAdapter {
        metadata: AdapterMetadata,
        credentials_ok: bool,
        configuration_ok: bool,
        reachable: bool,
        hook_panics: bool,
    }

    impl CheckingAdapter {
        fn new(name: &str, version: &str, platform: &str) -> Self {
            Self {
                metadata: AdapterMetadata::new(name, version, platform),
                credentials_ok: true,
                configuration_ok: true,
                reachable: true,
                hook_panics: false,
            }
        }
    }

    #[async_trait]
    impl CollectionAdapter for CheckingAdapter {
        fn metadata(&self) -> &AdapterMetadata {
            &self.metadata
        }
        async fn validate_credentials(&self, _credentials: &Credentials) -> bool {
            if self.hook_panics {
                panic!("credential store unreachable");
            }
            self.credentials_ok
        }
        async fn validate_configuration(&self, _configuration: &Value) -> bool {
            self.configuration_ok
        }
        async fn test_connectivity(&self, _configuration: &Value) -> bool {
            self.reachable
        }
        async fn collect_data(
            &self,
            _request: &CollectionRequest,
            _cancel: &CancellationToken,
        ) -> Result<CollectionResponse, AdapterError> {
            Ok(CollectionResponse::success(0, Value::Null))
        }
        fn transform_data(&self, _raw: &Value) -> Result<TransformedData, AdapterError> {
            Ok(TransformedData::new())
        }
    }

    fn requests(platforms: &[&str]) -> BTreeMap<Platform, CollectionRequest> {
        platforms
            .iter()
            .map(|p| (Platform::new(*p), CollectionRequest::new(*p)))
            .collect()
    }

    #[tokio::test]
    async fn test_selects_newest_adapter() {
        let mut registry = InMemoryAdapterRegistry::new();
        registry.register(CheckingAdapter::new("aws-legacy", "1.9.0", "aws"));
        registry.register(CheckingAdapter::new("aws-modern", "1.10.0", "aws"));

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(requests(&["aws"])).await;

        assert_eq!(prepared.tasks.len(), 1);
        assert_eq!(prepared.tasks[0].metadata.name, "aws-modern");
    }

    #[tokio::test]
    async fn test_missing_adapter_is_skipped() {
        let mut registry = InMemoryAdapterRegistry::new();
        registry.register(CheckingAdapter::new("aws", "1.0.0", "aws"));

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(requests(&["aws", "gcp"])).await;

        assert_eq!(prepared.tasks.len(), 1);
        assert_eq!(
            prepared.skipped,
            vec![(Platform::new("gcp"), TaskSkip::NoAdapter(Platform::new("gcp")))]
        );
    }

    #[tokio::test]
    async fn test_validation_failures_exclude_task() {
        let mut registry = InMemoryAdapterRegistry::new();
        let mut bad_creds = CheckingAdapter::new("aws", "1.0.0", "aws");
        bad_creds.credentials_ok = false;
        let mut bad_config = CheckingAdapter::new("vsphere", "1.0.0", "vmware");
        bad_config.configuration_ok = false;
        registry.register(bad_creds);
        registry.register(bad_config);

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(requests(&["aws", "vmware"])).await;

        assert!(prepared.tasks.is_empty());
        assert!(matches!(prepared.skipped[0].1, TaskSkip::InvalidCredentials(_)));
        assert!(matches!(prepared.skipped[1].1, TaskSkip::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_failed_connectivity_is_advisory() {
        let mut registry = InMemoryAdapterRegistry::new();
        let mut offline = CheckingAdapter::new("aws", "1.0.0", "aws");
        offline.reachable = false;
        registry.register(offline);

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(requests(&["aws"])).await;

        assert_eq!(prepared.tasks.len(), 1);
        assert!(prepared.skipped.is_empty());
    }

    #[tokio::test]
    async fn test_task_request_carries_map_platform() {
        let mut registry = InMemoryAdapterRegistry::new();
        registry.register(CheckingAdapter::new("aws", "1.0.0", "aws"));

        let mut map = BTreeMap::new();
        map.insert(Platform::new("aws"), CollectionRequest::new("mislabelled"));

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(map).await;
        assert_eq!(prepared.tasks[0].request.platform, Platform::new("aws"));
    }

    #[tokio::test]
    async fn test_panicking_hook_skips_only_its_platform() {
        let mut registry = InMemoryAdapterRegistry::new();
        let mut fragile = CheckingAdapter::new("azure", "1.0.0", "azure");
        fragile.hook_panics = true;
        registry.register(fragile);
        registry.register(CheckingAdapter::new("aws", "1.0.0", "aws"));

        let preparer = TaskPreparer::new(Arc::new(registry));
        let prepared = preparer.prepare(requests(&["aws", "azure"])).await;

        assert_eq!(prepared.tasks.len(), 1);
        assert_eq!(prepared.tasks[0].platform, Platform::new("aws"));
        assert_eq!(
            prepared.skipped,
            vec![(
                Platform::new("azure"),
                TaskSkip::ValidationPanicked {
                    name: "azure".into(),
                    reason: "credential store unreachable".into(),
                }
            )]
        );
    }
}
