//! Scriptable collection adapter for integration tests
//!
//! Collected data is the adapter's asset list serialized under `"assets"`,
//! so `transform_data` exercises a real JSON round trip.

use async_trait::async_trait;
use convoy::{
    AdapterError, AdapterMetadata, Asset, CancellationToken, CollectionAdapter, CollectionRequest,
    CollectionResponse, Credentials, TransformedData,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What `collect_data` does after its delay
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed,
    Fail(String),
    /// Fail the first `n` calls, then succeed
    FailTimes(u32),
    /// Return a response with `success == false`
    Unsuccessful(String),
    Panic,
}

/// Tracks how many adapters are inside `collect_data` at once
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ProbeGuard(Arc::clone(self))
    }
}

struct ProbeGuard(Arc<ConcurrencyProbe>);

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct MockAdapter {
    metadata: AdapterMetadata,
    outcome: Outcome,
    delay: Option<Duration>,
    honors_cancel: bool,
    credentials_ok: bool,
    validation_panics: bool,
    broken_transform: bool,
    assets: Vec<Asset>,
    probe: Option<Arc<ConcurrencyProbe>>,
    calls: AtomicU32,
}

impl MockAdapter {
    pub fn new(platform: &str) -> Self {
        Self {
            metadata: AdapterMetadata::new(format!("{}-collector", platform), "1.0.0", platform),
            outcome: Outcome::Succeed,
            delay: None,
            honors_cancel: false,
            credentials_ok: true,
            validation_panics: false,
            broken_transform: false,
            assets: Vec::new(),
            probe: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Stop sleeping early once the run is cancelled
    pub fn honoring_cancel(mut self) -> Self {
        self.honors_cancel = true;
        self
    }

    pub fn rejecting_credentials(mut self) -> Self {
        self.credentials_ok = false;
        self
    }

    pub fn panicking_in_validation(mut self) -> Self {
        self.validation_panics = true;
        self
    }

    pub fn with_broken_transform(mut self) -> Self {
        self.broken_transform = true;
        self
    }

    pub fn with_assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    async fn wait(&self, cancel: &CancellationToken) -> Result<(), AdapterError> {
        let Some(delay) = self.delay else {
            return Ok(());
        };
        if !self.honors_cancel {
            tokio::time::sleep(delay).await;
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        }
    }

    fn success(&self) -> CollectionResponse {
        CollectionResponse::success(self.assets.len(), json!({ "assets": self.assets }))
            .with_method("api")
    }
}

#[async_trait]
impl CollectionAdapter for MockAdapter {
    fn metadata(&self) -> &AdapterMetadata {
        &self.metadata
    }

    async fn validate_credentials(&self, _credentials: &Credentials) -> bool {
        if self.validation_panics {
            panic!("vault lookup crashed");
        }
        self.credentials_ok
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
        cancel: &CancellationToken,
    ) -> Result<CollectionResponse, AdapterError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.probe.as_ref().map(|probe| probe.enter());

        self.wait(cancel).await?;

        match &self.outcome {
            Outcome::Succeed => Ok(self.success()),
            Outcome::Fail(message) => Err(AdapterError::Collection(message.clone())),
            Outcome::FailTimes(n) if call <= *n => {
                Err(AdapterError::Connection(format!("transient failure #{}", call)))
            }
            Outcome::FailTimes(_) => Ok(self.success()),
            Outcome::Unsuccessful(message) => Ok(CollectionResponse::failure(message.clone())),
            Outcome::Panic => panic!("collector crashed"),
        }
    }

    fn transform_data(&self, raw: &Value) -> Result<TransformedData, AdapterError> {
        if self.broken_transform {
            return Err(AdapterError::Transform("unrecognized record layout".into()));
        }
        let assets: Vec<Asset> = match raw.get("assets") {
            Some(list) => serde_json::from_value(list.clone())?,
            None => Vec::new(),
        };
        let mut data = TransformedData::new().with_assets(assets);
        data.performance_metrics
            .insert("calls".into(), json!(self.calls.load(Ordering::SeqCst)));
        Ok(data)
    }
}
