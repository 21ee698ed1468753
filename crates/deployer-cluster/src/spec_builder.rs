//! Desired InferenceService construction
//!
//! Output depends only on the request and the resource profile, so building
//! twice from the same input yields identical objects. Maps are ordered for
//! the same reason.

use std::collections::BTreeMap;

use kube::api::ObjectMeta;

use deployer_common::{ResourceProfile, LABEL_MANAGED_BY, LABEL_MANAGED_BY_DEPLOYER};

use crate::request::DeploymentRequest;
use crate::resource::{
    ContainerResources, EnvVar, InferenceService, InferenceServiceSpec, PredictorContainer,
    PredictorSpec, PREDICTOR_CONTAINER_NAME,
};

/// Label carrying the model name
pub const LABEL_MODEL: &str = "deployer.io/model";
/// Label carrying the model version
pub const LABEL_VERSION: &str = "deployer.io/version";
/// Label carrying the target environment
pub const LABEL_ENVIRONMENT: &str = "deployer.io/environment";

/// Labels identifying a deployment; caller labels cannot override these
pub fn managed_labels(request: &DeploymentRequest) -> BTreeMap<String, String> {
    let mut labels = request.labels.clone();
    labels.insert(LABEL_MANAGED_BY.to_string(), LABEL_MANAGED_BY_DEPLOYER.to_string());
    labels.insert(LABEL_MODEL.to_string(), request.model_name.clone());
    labels.insert(LABEL_VERSION.to_string(), request.version.clone());
    labels.insert(LABEL_ENVIRONMENT.to_string(), request.environment.clone());
    labels
}

/// Label selector matching the pods of a deployment
pub fn pod_selector(request: &DeploymentRequest) -> String {
    format!(
        "{}={},{}={}",
        LABEL_MODEL, request.model_name, LABEL_VERSION, request.version
    )
}

/// Build the desired InferenceService for a request
pub fn build_inference_service(
    request: &DeploymentRequest,
    profile: &ResourceProfile,
) -> InferenceService {
    let mut requests = BTreeMap::new();
    requests.insert("cpu".to_string(), profile.cpu_request.clone());
    requests.insert("memory".to_string(), profile.memory_request.clone());

    // Memory is incompressible, so its limit pins to the request; CPU may burst
    let mut limits = BTreeMap::new();
    limits.insert("memory".to_string(), profile.memory_request.clone());

    let env = request
        .container
        .env
        .iter()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        })
        .collect();

    let container = PredictorContainer {
        name: PREDICTOR_CONTAINER_NAME.to_string(),
        image: request.container.image.clone(),
        command: request.container.command.clone(),
        args: request.container.args.clone(),
        env,
        resources: ContainerResources { requests, limits },
    };

    InferenceService {
        metadata: ObjectMeta {
            name: Some(request.name.clone()),
            namespace: Some(request.namespace.clone()),
            labels: Some(managed_labels(request)),
            ..Default::default()
        },
        spec: InferenceServiceSpec {
            predictor: PredictorSpec {
                min_replicas: Some(profile.min_replica),
                max_replicas: Some(profile.max_replica),
                containers: vec![container],
            },
        },
        status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ContainerOverrides;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn request() -> DeploymentRequest {
        let mut env = BTreeMap::new();
        env.insert("MODEL_DIR".to_string(), "/mnt/models".to_string());
        env.insert("LOG_LEVEL".to_string(), "info".to_string());

        let mut labels = BTreeMap::new();
        labels.insert("team".to_string(), "risk".to_string());
        labels.insert(LABEL_MODEL.to_string(), "spoofed".to_string());

        DeploymentRequest {
            name: "fraud-detector-3".to_string(),
            namespace: "risk".to_string(),
            model_name: "fraud-detector".to_string(),
            version: "3".to_string(),
            environment: "staging".to_string(),
            container: ContainerOverrides {
                image: "registry/fraud:3".to_string(),
                command: vec!["python".to_string()],
                args: vec!["-m".to_string(), "server".to_string()],
                env,
            },
            resources: None,
            labels,
        }
    }

    #[test]
    fn builds_predictor_from_request_and_profile() {
        let profile = ResourceProfile::default();
        let isvc = build_inference_service(&request(), &profile);

        assert_eq!(isvc.metadata.name.as_deref(), Some("fraud-detector-3"));
        assert_eq!(isvc.metadata.namespace.as_deref(), Some("risk"));
        assert!(isvc.status.is_none());

        let predictor = &isvc.spec.predictor;
        assert_eq!(predictor.min_replicas, Some(1));
        assert_eq!(predictor.max_replicas, Some(2));

        let container = &predictor.containers[0];
        assert_eq!(container.name, PREDICTOR_CONTAINER_NAME);
        assert_eq!(container.image, "registry/fraud:3");
        assert_eq!(container.args, vec!["-m", "server"]);
        // Env is ordered by name
        assert_eq!(container.env[0].name, "LOG_LEVEL");
        assert_eq!(container.env[1].name, "MODEL_DIR");

        assert_eq!(
            container.resources.requests.get("cpu"),
            Some(&Quantity("500m".to_string()))
        );
        assert_eq!(
            container.resources.limits.get("memory"),
            Some(&Quantity("512Mi".to_string()))
        );
        assert!(container.resources.limits.get("cpu").is_none());
    }

    #[test]
    fn caller_labels_cannot_override_managed_labels() {
        let isvc = build_inference_service(&request(), &ResourceProfile::default());
        let labels = isvc.metadata.labels.unwrap();

        assert_eq!(labels.get(LABEL_MODEL).map(String::as_str), Some("fraud-detector"));
        assert_eq!(labels.get(LABEL_MANAGED_BY).map(String::as_str), Some("deployer"));
        assert_eq!(labels.get(LABEL_ENVIRONMENT).map(String::as_str), Some("staging"));
        assert_eq!(labels.get("team").map(String::as_str), Some("risk"));
    }

    #[test]
    fn same_input_builds_identical_objects() {
        let profile = ResourceProfile::default();
        assert_eq!(
            build_inference_service(&request(), &profile),
            build_inference_service(&request(), &profile)
        );
    }

    #[test]
    fn selector_targets_model_version_pods() {
        assert_eq!(
            pod_selector(&request()),
            "deployer.io/model=fraud-detector,deployer.io/version=3"
        );
    }
}
