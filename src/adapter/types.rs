//! Core types exchanged with collection adapters
//!
//! Requests go in, responses come out, and `transform_data` turns the raw
//! payload into platform-neutral assets, dependencies and metrics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier for a source platform (e.g. "aws", "vmware", "servicenow")
///
/// Serializes as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Platform(String);

impl Platform {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Credential key/value pairs handed to an adapter
pub type Credentials = BTreeMap<String, String>;

/// What to collect from one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRequest {
    /// Target platform
    pub platform: Platform,
    /// Credentials checked by `validate_credentials`
    #[serde(default)]
    pub credentials: Credentials,
    /// Adapter-specific configuration (endpoints, regions, filters)
    #[serde(default)]
    pub configuration: Value,
    /// Optional narrowing of the collection scope (accounts, clusters, hosts)
    #[serde(default)]
    pub targets: Vec<String>,
}

impl CollectionRequest {
    pub fn new(platform: impl Into<Platform>) -> Self {
        Self {
            platform: platform.into(),
            credentials: Credentials::new(),
            configuration: Value::Null,
            targets: Vec::new(),
        }
    }

    pub fn with_credential(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.credentials.insert(key.into(), value.into());
        self
    }

    pub fn with_configuration(mut self, configuration: Value) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}

/// Response returned by `collect_data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionResponse {
    /// Whether the adapter considers the collection successful
    pub success: bool,
    /// Number of resources the adapter discovered
    #[serde(default)]
    pub resource_count: usize,
    /// Adapter-reported collection time
    #[serde(default)]
    pub duration_seconds: f64,
    /// Failure description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// How the data was gathered (e.g. "api", "agent", "snmp")
    #[serde(default)]
    pub collection_method: String,
    /// Raw payload, fed back into `transform_data`
    #[serde(default)]
    pub data: Value,
}

impl CollectionResponse {
    /// A successful response carrying `data`
    pub fn success(resource_count: usize, data: Value) -> Self {
        Self {
            success: true,
            resource_count,
            duration_seconds: 0.0,
            error_message: None,
            collection_method: String::new(),
            data,
        }
    }

    /// An unsuccessful response with an explanation
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            resource_count: 0,
            duration_seconds: 0.0,
            error_message: Some(message.into()),
            collection_method: String::new(),
            data: Value::Null,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.collection_method = method.into();
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }
}

/// A discovered asset in platform-neutral form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    /// Identifier unique within its platform
    pub id: String,
    /// Platform the asset was discovered on
    pub platform: Platform,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub asset_type: String,
    /// Primary address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Cross-platform identity such as a serial number or BIOS UUID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Untouched platform record
    #[serde(default)]
    pub raw_data: Value,
    #[serde(default)]
    pub performance_metrics: Map<String, Value>,
    /// Present only on records produced by deduplication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_info: Option<MergeInfo>,
}

impl Asset {
    pub fn new(id: impl Into<String>, platform: impl Into<Platform>) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            name: String::new(),
            asset_type: String::new(),
            ip_address: None,
            private_ip: None,
            hostname: None,
            mac_address: None,
            unique_identifier: None,
            service_name: None,
            port: None,
            raw_data: Value::Null,
            performance_metrics: Map::new(),
            merge_info: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = asset_type.into();
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_private_ip(mut self, ip: impl Into<String>) -> Self {
        self.private_ip = Some(ip.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_unique_identifier(mut self, id: impl Into<String>) -> Self {
        self.unique_identifier = Some(id.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>, port: u16) -> Self {
        self.service_name = Some(service.into());
        self.port = Some(port);
        self
    }

    pub fn with_raw_data(mut self, raw: Value) -> Self {
        self.raw_data = raw;
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.performance_metrics.insert(key.into(), value.into());
        self
    }

    /// The address used for identity matching: public/primary first, then private
    pub fn primary_ip(&self) -> Option<&str> {
        non_empty(self.ip_address.as_deref()).or_else(|| non_empty(self.private_ip.as_deref()))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Provenance attached to an asset that absorbed duplicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeInfo {
    pub merged_from_platforms: BTreeSet<Platform>,
    pub original_asset_count: usize,
    /// Raw record per contributing platform
    pub platform_data: BTreeMap<Platform, Value>,
    /// Performance metrics per contributing platform
    pub platform_metrics: BTreeMap<Platform, Map<String, Value>>,
    /// Lowest pairwise similarity among the merged members
    pub merge_confidence: f64,
}

/// A relationship between two assets discovered by one adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub source_id: String,
    pub target_id: String,
    /// e.g. "connects_to", "runs_on", "depends_on"
    pub dependency_type: String,
    pub platform: Platform,
    #[serde(default)]
    pub properties: Value,
}

impl Dependency {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        dependency_type: impl Into<String>,
        platform: impl Into<Platform>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            dependency_type: dependency_type.into(),
            platform: platform.into(),
            properties: Value::Null,
        }
    }
}

/// Platform-neutral shapes produced by `transform_data`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformedData {
    pub assets: Vec<Asset>,
    pub dependencies: Vec<Dependency>,
    pub performance_metrics: Map<String, Value>,
}

impl TransformedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(mut self, assets: Vec<Asset>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Errors raised by adapters
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Collection error: {0}")]
    Collection(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("Collection cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}
