//! Deployment request types
//!
//! A [`DeploymentRequest`] is assembled by the API layer from persisted
//! model and version records and handed to the controller already
//! validated. It is immutable for the duration of one call.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use deployer_common::ResourceProfile;

/// Name of the serving resource for a model version
pub fn serving_resource_name(model: &str, version: &str) -> String {
    format!("{}-{}", model, version)
}

/// Image, entrypoint and environment of the model server container
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverrides {
    /// Image reference
    pub image: String,
    /// Entrypoint override
    #[serde(default)]
    pub command: Vec<String>,
    /// Entrypoint arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables, ordered by name
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// Desired serving deployment for one model version
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    /// Serving resource name, usually [`serving_resource_name`]
    pub name: String,
    /// Target namespace (one per project)
    pub namespace: String,
    /// Model the version belongs to
    pub model_name: String,
    /// Version identifier
    pub version: String,
    /// Environment the deployment targets
    pub environment: String,
    /// Model server container
    pub container: ContainerOverrides,
    /// Compute and autoscaling bounds; the configured default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceProfile>,
    /// Extra labels stamped on the serving resource
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl DeploymentRequest {
    /// Resource profile to use, falling back to `default`
    pub fn resources_or<'a>(&'a self, default: &'a ResourceProfile) -> &'a ResourceProfile {
        self.resources.as_ref().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn resource_name_joins_model_and_version() {
        assert_eq!(serving_resource_name("fraud-detector", "3"), "fraud-detector-3");
    }

    #[test]
    fn missing_resources_fall_back_to_default() {
        let mut request: DeploymentRequest = serde_json::from_value(serde_json::json!({
            "name": "fraud-detector-3",
            "namespace": "risk",
            "modelName": "fraud-detector",
            "version": "3",
            "environment": "staging",
            "container": { "image": "registry/fraud:3" }
        }))
        .unwrap();

        let default = ResourceProfile::default();
        assert_eq!(request.resources_or(&default), &default);
        assert!(request.labels.is_empty());

        let custom = ResourceProfile {
            cpu_request: Quantity("2".to_string()),
            ..Default::default()
        };
        request.resources = Some(custom.clone());
        assert_eq!(request.resources_or(&default), &custom);
    }
}
