//! Integration tests for the deployment controller
//!
//! Drives the public `Controller` API against the in-memory cluster client:
//! namespace creation, create-then-update idempotence, readiness priority,
//! deadlines and pod introspection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use deployer_cluster::resource::{
    Condition, ConditionStatus, CONDITION_INGRESS_READY, CONDITION_PREDICTOR_READY,
    CONDITION_READY,
};
use deployer_cluster::{
    pod_selector, serving_resource_name, ContainerOverrides, Controller, DeploymentOutcome,
    DeploymentRequest, InferenceServiceStatus, MemoryClusterClient,
};
use deployer_common::{DeploymentConfig, Error, ResourceDimension, ResourceProfile};

const URL: &str = "http://fraud-detector-3.risk.models.example.com";

// =============================================================================
// Fixtures
// =============================================================================

fn config() -> DeploymentConfig {
    DeploymentConfig {
        namespace_timeout: Duration::from_secs(5),
        deployment_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(5),
        ..Default::default()
    }
}

fn request() -> DeploymentRequest {
    DeploymentRequest {
        name: serving_resource_name("fraud-detector", "3"),
        namespace: "risk".to_string(),
        model_name: "fraud-detector".to_string(),
        version: "3".to_string(),
        environment: "production".to_string(),
        container: ContainerOverrides {
            image: "registry.example.com/fraud-detector:3".to_string(),
            args: vec!["--model_name=fraud-detector-3".to_string()],
            ..Default::default()
        },
        resources: Some(ResourceProfile {
            min_replica: 1,
            max_replica: 4,
            cpu_request: Quantity("100m".to_string()),
            memory_request: Quantity("1Gi".to_string()),
        }),
        labels: BTreeMap::new(),
    }
}

fn status(url: Option<&str>, conditions: &[(&str, ConditionStatus, Option<&str>)]) -> InferenceServiceStatus {
    InferenceServiceStatus {
        url: url.map(str::to_string),
        conditions: conditions
            .iter()
            .map(|(t, s, m)| Condition::new(*t, *s, *m))
            .collect(),
        ..Default::default()
    }
}

fn ready() -> InferenceServiceStatus {
    status(Some(URL), &[(CONDITION_READY, ConditionStatus::True, None)])
}

fn predictor_pod(name: &str, request: &DeploymentRequest) -> Pod {
    let labels = BTreeMap::from([
        ("deployer.io/model".to_string(), request.model_name.clone()),
        ("deployer.io/version".to_string(), request.version.clone()),
    ]);
    let container = |n: &str| Container {
        name: n.to_string(),
        ..Default::default()
    };
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(request.namespace.clone()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec {
            init_containers: Some(vec![container("storage-initializer")]),
            containers: vec![
                container("kserve-container"),
                container("queue-proxy"),
                container("inferenceservice-logger"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Deploy
// =============================================================================

/// Story: a model version is deployed into a project that has no namespace yet
#[tokio::test]
async fn story_deploy_into_new_namespace() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace_propagation(2)
            .with_serving_status(ready())
            .with_status_delay(3),
    );
    let controller = Controller::new(client.clone(), config()).unwrap();

    let outcome = controller.deploy(&request()).await.unwrap();
    assert_eq!(outcome, DeploymentOutcome::Ready(URL.to_string()));

    let calls = client.calls();
    assert_eq!(calls.create_namespace, 1);
    assert_eq!(calls.create_service, 1);

    let stored = client.service("risk", "fraud-detector-3").unwrap();
    let labels = stored.metadata.labels.unwrap();
    assert_eq!(
        labels.get("deployer.io/environment").map(String::as_str),
        Some("production")
    );
    assert_eq!(stored.spec.predictor.max_replicas, Some(4));
}

/// Story: redeploying an already-ready version updates in place and never
/// creates a second resource
#[tokio::test]
async fn story_repeated_deploy_is_idempotent() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace("risk", "Active")
            .with_serving_status(ready()),
    );
    let controller = Controller::new(client.clone(), config()).unwrap();

    let first = controller.deploy(&request()).await.unwrap();
    let second = controller.deploy(&request()).await.unwrap();
    let third = controller.deploy(&request()).await.unwrap();

    assert_eq!(first, DeploymentOutcome::Ready(URL.to_string()));
    assert_eq!(second, first);
    assert_eq!(third, first);

    let calls = client.calls();
    assert_eq!(calls.create_service, 1);
    assert_eq!(calls.update_service, 2);
    assert_eq!(calls.create_namespace, 0);
}

#[tokio::test]
async fn terminating_namespace_fails_fast() {
    let client = Arc::new(MemoryClusterClient::new().with_namespace("risk", "Terminating"));
    let controller = Controller::new(
        client.clone(),
        DeploymentConfig {
            namespace_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            ..config()
        },
    )
    .unwrap();

    let started = std::time::Instant::now();
    let err = controller.deploy(&request()).await.unwrap_err();

    assert!(matches!(err, Error::NamespaceUnavailable { .. }));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(client.calls().writes(), 0);
}

#[tokio::test]
async fn tiny_deadline_times_out_even_when_ready() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace("risk", "Active")
            .with_serving_status(ready()),
    );
    let controller = Controller::new(
        client,
        DeploymentConfig {
            deployment_timeout: Duration::from_millis(1),
            poll_interval: Duration::from_millis(50),
            ..config()
        },
    )
    .unwrap();

    let outcome = controller.deploy(&request()).await.unwrap();
    assert_eq!(outcome, DeploymentOutcome::TimedOut);
}

#[tokio::test]
async fn predictor_error_takes_priority_over_routes_error() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace("risk", "Active")
            .with_serving_status(status(
                None,
                &[
                    (CONDITION_INGRESS_READY, ConditionStatus::False, Some("routes error")),
                    (CONDITION_PREDICTOR_READY, ConditionStatus::False, Some("predictor error")),
                    (CONDITION_READY, ConditionStatus::False, None),
                ],
            )),
    );
    let controller = Controller::new(client, config()).unwrap();

    match controller.deploy(&request()).await.unwrap() {
        DeploymentOutcome::Failed(reason) => assert!(reason.starts_with("predictor error")),
        other => panic!("expected predictor failure, got {other:?}"),
    }
}

#[tokio::test]
async fn routes_error_alone_is_reported() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace("risk", "Active")
            .with_serving_status(status(
                None,
                &[
                    (CONDITION_INGRESS_READY, ConditionStatus::False, Some("gateway missing")),
                    (CONDITION_PREDICTOR_READY, ConditionStatus::True, None),
                ],
            )),
    );
    let controller = Controller::new(client, config()).unwrap();

    assert_eq!(
        controller.deploy(&request()).await.unwrap(),
        DeploymentOutcome::Failed("routes error: gateway missing".to_string())
    );
}

#[tokio::test]
async fn over_quota_request_never_touches_the_cluster() {
    let client = Arc::new(MemoryClusterClient::new());
    let controller = Controller::new(client.clone(), config()).unwrap();

    let mut req = request();
    req.resources = Some(ResourceProfile {
        cpu_request: Quantity("10".to_string()),
        ..Default::default()
    });

    let err = controller.deploy(&req).await.unwrap_err();
    assert!(matches!(
        err,
        Error::QuotaExceeded {
            dimension: ResourceDimension::Cpu,
            ..
        }
    ));
    assert_eq!(client.calls(), Default::default());
}

/// Story: two deploys race on the same resource; the store's version check
/// rejects the writer holding a stale token
#[tokio::test]
async fn story_concurrent_writer_loses_on_stale_version() {
    let client = Arc::new(
        MemoryClusterClient::new()
            .with_namespace("risk", "Active")
            .with_serving_status(ready()),
    );
    let controller = Controller::new(client.clone(), config()).unwrap();
    controller.deploy(&request()).await.unwrap();

    // A writer that read the object before the second deploy
    let stale = client.service("risk", "fraud-detector-3").unwrap();
    controller.deploy(&request()).await.unwrap();

    use deployer_cluster::ClusterClient;
    let err = client.update_inference_service(&stale).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(err.is_retryable());
}

// =============================================================================
// Undeploy and introspection
// =============================================================================

#[tokio::test]
async fn undeploy_absent_resource_is_not_an_error() {
    let client = Arc::new(MemoryClusterClient::new().with_namespace("risk", "Active"));
    let controller = Controller::new(client, config()).unwrap();
    assert!(!controller.undeploy(&request()).await.unwrap());
}

#[tokio::test]
async fn pods_and_containers_follow_the_selector() {
    let req = request();
    let mut other = request();
    other.version = "2".to_string();

    let client = Arc::new(
        MemoryClusterClient::new()
            .with_pod(predictor_pod("fraud-detector-3-predictor-a", &req))
            .with_pod(predictor_pod("fraud-detector-2-predictor-a", &other))
            .with_pod(predictor_pod("fraud-detector-3-predictor-b", &req)),
    );
    let controller = Controller::new(
        client,
        DeploymentConfig {
            cluster: deployer_common::ClusterMetadata {
                cluster_name: "prod-1".to_string(),
                project: "ml-platform".to_string(),
            },
            ..config()
        },
    )
    .unwrap();

    let selector = pod_selector(&req);
    let snapshot = controller.list_pods("risk", &selector).await.unwrap();
    assert_eq!(
        snapshot.pod_names(),
        vec!["fraud-detector-3-predictor-a", "fraud-detector-3-predictor-b"]
    );

    let containers = controller.get_containers("risk", &selector).await.unwrap();
    assert_eq!(containers.len(), 8);
    assert!(containers
        .iter()
        .filter(|c| c.init)
        .all(|c| c.name == "storage-initializer"));
    assert!(containers.iter().all(|c| c.cluster == "prod-1"));
}
