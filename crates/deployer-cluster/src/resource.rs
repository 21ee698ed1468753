//! InferenceService resource types
//!
//! Typed view of the serving platform's `serving.kserve.io/v1beta1`
//! InferenceService. Only the fields this crate writes (predictor spec) or
//! reads (status conditions and addresses) are modeled; the platform's own
//! controllers own everything under `status`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Aggregate readiness condition set by the platform
pub const CONDITION_READY: &str = "Ready";
/// Predictor workload readiness condition
pub const CONDITION_PREDICTOR_READY: &str = "PredictorReady";
/// Routing/ingress readiness condition
pub const CONDITION_INGRESS_READY: &str = "IngressReady";

/// Resource kind used in errors and logs
pub const INFERENCE_SERVICE_KIND: &str = "InferenceService";

/// Name of the model server container inside the predictor
pub const PREDICTOR_CONTAINER_NAME: &str = "kserve-container";

// =============================================================================
// Spec
// =============================================================================

/// Desired state of a serving resource
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "serving.kserve.io",
    version = "v1beta1",
    kind = "InferenceService",
    plural = "inferenceservices",
    shortname = "isvc",
    namespaced,
    status = "InferenceServiceStatus",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceSpec {
    /// Model server workload
    pub predictor: PredictorSpec,
}

/// Predictor component: replica bounds and the model server container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorSpec {
    /// Lower autoscaling bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<u32>,

    /// Upper autoscaling bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_replicas: Option<u32>,

    /// Containers run by each predictor pod
    #[serde(default)]
    pub containers: Vec<PredictorContainer>,
}

/// A container in the predictor pod
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictorContainer {
    /// Container name
    pub name: String,

    /// Image reference
    pub image: String,

    /// Entrypoint override
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Arguments to the entrypoint
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Compute requests and limits
    #[serde(default)]
    pub resources: ContainerResources,
}

/// A single environment variable
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Variable value
    pub value: String,
}

/// Container compute requests and limits keyed by resource name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct ContainerResources {
    /// Guaranteed resources
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,

    /// Hard caps
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

// =============================================================================
// Status
// =============================================================================

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A status condition reported by the platform
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g., Ready, PredictorReady)
    #[serde(rename = "type")]
    pub type_: String,

    /// True, False or Unknown
    #[serde(default)]
    pub status: ConditionStatus,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last transition timestamp as reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    /// Build a condition with the given type, status and message
    pub fn new(type_: impl Into<String>, status: ConditionStatus, message: Option<&str>) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: None,
            message: message.map(str::to_string),
            last_transition_time: None,
        }
    }
}

/// In-cluster address of the service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Addressable {
    /// Cluster-local URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Observed state, written only by the platform's controllers
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InferenceServiceStatus {
    /// Externally reachable URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Cluster-local address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,

    /// Readiness conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation the platform last acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl InferenceServiceStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Status of a condition, `Unknown` when not reported
    pub fn condition_status(&self, type_: &str) -> ConditionStatus {
        self.condition(type_).map(|c| c.status).unwrap_or_default()
    }

    /// Externally reachable URL, falling back to the cluster-local one
    pub fn reachable_url(&self) -> Option<&str> {
        let non_empty = |u: &&str| !u.is_empty();
        self.url.as_deref().filter(non_empty).or_else(|| {
            self.address
                .as_ref()
                .and_then(|a| a.url.as_deref())
                .filter(non_empty)
        })
    }
}
