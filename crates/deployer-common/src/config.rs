//! Deployment configuration
//!
//! Per-environment settings consumed by the controller: wait budgets, the
//! polling tick, compute ceilings and the resource profile applied when a
//! request does not carry one. Loaded from YAML.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::quantity::{quantity_cpu_millis, quantity_memory_bytes};
use crate::Error;

/// Default field manager recorded on writes
pub const DEFAULT_FIELD_MANAGER: &str = "deployer";

/// Requested compute for one serving deployment.
///
/// CPU and memory are per-pod values; replica bounds drive autoscaling.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProfile {
    /// Minimum replica count
    pub min_replica: u32,
    /// Maximum replica count
    pub max_replica: u32,
    /// CPU request per pod (e.g., "500m")
    pub cpu_request: Quantity,
    /// Memory request per pod (e.g., "512Mi")
    pub memory_request: Quantity,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            min_replica: 1,
            max_replica: 2,
            cpu_request: Quantity("500m".to_string()),
            memory_request: Quantity("512Mi".to_string()),
        }
    }
}

/// Identity of the cluster this controller deploys into
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetadata {
    /// Cluster name reported in container diagnostics
    #[serde(default)]
    pub cluster_name: String,
    /// Cloud project hosting the cluster
    #[serde(default)]
    pub project: String,
}

/// Controller configuration for one environment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    /// Budget for a newly created namespace to become Active
    #[serde(with = "duration")]
    pub namespace_timeout: Duration,
    /// Budget for a serving resource to report a terminal condition
    #[serde(with = "duration")]
    pub deployment_timeout: Duration,
    /// Tick interval shared by namespace and readiness waits
    #[serde(with = "duration")]
    pub poll_interval: Duration,
    /// Per-pod CPU ceiling
    pub max_cpu: Quantity,
    /// Per-pod memory ceiling
    pub max_memory: Quantity,
    /// Profile used when a request carries none
    pub default_resources: ResourceProfile,
    /// Cluster identity for diagnostics
    pub cluster: ClusterMetadata,
    /// Field manager sent with every write
    pub field_manager: String,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            namespace_timeout: Duration::from_secs(60),
            deployment_timeout: Duration::from_secs(300),
            poll_interval: crate::poll::DEFAULT_POLL_INTERVAL,
            max_cpu: Quantity("8".to_string()),
            max_memory: Quantity("8Gi".to_string()),
            default_resources: ResourceProfile::default(),
            cluster: ClusterMetadata::default(),
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl DeploymentConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let config: Self =
            serde_yaml::from_str(input).map_err(|e| Error::serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::internal_with_context(
                "config",
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        Self::from_yaml(&content)
    }

    /// Check that ceilings parse and the tick is usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval.is_zero() {
            return Err(Error::validation("pollInterval", "must be greater than zero"));
        }
        quantity_cpu_millis(&self.max_cpu)
            .map_err(|e| Error::validation("maxCpu", e.to_string()))?;
        quantity_memory_bytes(&self.max_memory)
            .map_err(|e| Error::validation("maxMemory", e.to_string()))?;
        quantity_cpu_millis(&self.default_resources.cpu_request)
            .map_err(|e| Error::validation("defaultResources.cpuRequest", e.to_string()))?;
        quantity_memory_bytes(&self.default_resources.memory_request)
            .map_err(|e| Error::validation("defaultResources.memoryRequest", e.to_string()))?;
        if self.field_manager.is_empty() {
            return Err(Error::validation("fieldManager", "must not be empty"));
        }
        Ok(())
    }
}

/// Serde support for durations written as whole seconds (`30`) or with a
/// unit suffix (`"500ms"`, `"30s"`, `"5m"`).
mod duration {
    use std::time::Duration;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", value.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", value.as_millis()))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => parse(&text).map_err(D::Error::custom),
        }
    }

    pub(super) fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let (number, unit) = text
            .find(|c: char| !c.is_ascii_digit())
            .map(|idx| text.split_at(idx))
            .unwrap_or((text, "s"));
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{}'", text))?;
        let secs_per_unit = match unit {
            "ms" => return Ok(Duration::from_millis(value)),
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => return Err(format!("invalid duration unit in '{}'", text)),
        };
        value
            .checked_mul(secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("invalid duration '{}'", text))
    }
}
