//! Pod and container introspection
//!
//! Read-only views of the pods behind a deployment, used for diagnostics
//! and log lookup. Nothing here feeds back into reconciliation.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::Serialize;
use tracing::debug;

use deployer_common::{ClusterMetadata, Error};

use crate::client::ClusterClient;

/// One pod and its containers
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSummary {
    /// Pod name
    pub name: String,
    /// Pod phase if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Init container names, in spec order
    pub init_containers: Vec<String>,
    /// Regular container names, in spec order
    pub containers: Vec<String>,
}

impl From<&Pod> for PodSummary {
    fn from(pod: &Pod) -> Self {
        let spec = pod.spec.as_ref();
        Self {
            name: pod.name_any(),
            phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
            init_containers: spec
                .and_then(|s| s.init_containers.as_ref())
                .map(|cs| cs.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
            containers: spec
                .map(|s| s.containers.iter().map(|c| c.name.clone()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Pods matching a selector, in the order the store returned them
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PodSnapshot {
    /// Matching pods
    pub pods: Vec<PodSummary>,
}

impl PodSnapshot {
    /// Pod names in order
    pub fn pod_names(&self) -> Vec<&str> {
        self.pods.iter().map(|p| p.name.as_str()).collect()
    }
}

/// A container located in the cluster, ready for log lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    /// Container name
    pub name: String,
    /// Pod hosting the container
    pub pod_name: String,
    /// Pod namespace
    pub namespace: String,
    /// Cluster the pod runs in
    pub cluster: String,
    /// Project hosting the cluster
    pub project: String,
    /// Whether this is an init container
    pub init: bool,
}

/// Lists pods by label selector
pub struct PodLister {
    client: Arc<dyn ClusterClient>,
}

impl PodLister {
    /// Create a lister over `client`
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Snapshot of pods in `namespace` matching `label_selector`
    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<PodSnapshot, Error> {
        let pods = self.client.list_pods(namespace, label_selector).await?;
        debug!(namespace = %namespace, selector = %label_selector, count = pods.len(), "listed pods");
        Ok(PodSnapshot {
            pods: pods.iter().map(PodSummary::from).collect(),
        })
    }
}

/// Flattens pods into container rows stamped with cluster identity
pub struct ContainerFetcher {
    lister: PodLister,
    cluster: ClusterMetadata,
}

impl ContainerFetcher {
    /// Create a fetcher reporting `cluster` on every row
    pub fn new(client: Arc<dyn ClusterClient>, cluster: ClusterMetadata) -> Self {
        Self {
            lister: PodLister::new(client),
            cluster,
        }
    }

    /// Containers of every matching pod; init containers come first per pod
    pub async fn get_containers(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ContainerInfo>, Error> {
        let snapshot = self.lister.list_pods(namespace, label_selector).await?;
        let row = |pod: &PodSummary, name: &str, init: bool| ContainerInfo {
            name: name.to_string(),
            pod_name: pod.name.clone(),
            namespace: namespace.to_string(),
            cluster: self.cluster.cluster_name.clone(),
            project: self.cluster.project.clone(),
            init,
        };

        Ok(snapshot
            .pods
            .iter()
            .flat_map(|pod| {
                pod.init_containers
                    .iter()
                    .map(move |c| row(pod, c, true))
                    .chain(pod.containers.iter().map(move |c| row(pod, c, false)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterClient;
    use crate::memory::MemoryClusterClient;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const SELECTOR: &str = "serving.kserve.io/inferenceservice=fraud-1";

    fn pod(name: &str, isvc: &str) -> Pod {
        let container = |n: &str| Container {
            name: n.to_string(),
            ..Default::default()
        };
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("risk".to_string()),
                labels: Some(BTreeMap::from([(
                    "serving.kserve.io/inferenceservice".to_string(),
                    isvc.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(PodSpec {
                init_containers: Some(vec![container("storage-initializer")]),
                containers: vec![container("kserve-container"), container("queue-proxy")],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn cluster() -> ClusterMetadata {
        ClusterMetadata {
            cluster_name: "prod-1".to_string(),
            project: "ml-platform".to_string(),
        }
    }

    #[tokio::test]
    async fn lists_only_matching_pods() {
        let client = MemoryClusterClient::new()
            .with_pod(pod("fraud-1-predictor-a", "fraud-1"))
            .with_pod(pod("churn-2-predictor-a", "churn-2"))
            .with_pod(pod("fraud-1-predictor-b", "fraud-1"));
        let lister = PodLister::new(Arc::new(client));

        let snapshot = lister.list_pods("risk", SELECTOR).await.unwrap();
        assert_eq!(
            snapshot.pod_names(),
            vec!["fraud-1-predictor-a", "fraud-1-predictor-b"]
        );
        assert_eq!(snapshot.pods[0].init_containers, vec!["storage-initializer"]);
    }

    #[tokio::test]
    async fn other_namespaces_are_excluded() {
        let client = MemoryClusterClient::new().with_pod(pod("fraud-1-predictor-a", "fraud-1"));
        let lister = PodLister::new(Arc::new(client));
        assert!(lister.list_pods("other", SELECTOR).await.unwrap().pods.is_empty());
    }

    #[tokio::test]
    async fn containers_include_init_containers() {
        let client = MemoryClusterClient::new()
            .with_pod(pod("fraud-1-predictor-a", "fraud-1"))
            .with_pod(pod("fraud-1-predictor-b", "fraud-1"));
        let fetcher = ContainerFetcher::new(Arc::new(client), cluster());

        let containers = fetcher.get_containers("risk", SELECTOR).await.unwrap();
        assert_eq!(containers.len(), 6);

        let first = &containers[0];
        assert_eq!(first.name, "storage-initializer");
        assert!(first.init);
        assert_eq!(first.pod_name, "fraud-1-predictor-a");
        assert_eq!(first.cluster, "prod-1");
        assert_eq!(first.project, "ml-platform");

        assert!(containers
            .iter()
            .any(|c| c.name == "queue-proxy" && c.pod_name == "fraud-1-predictor-b" && !c.init));
    }

    #[tokio::test]
    async fn list_errors_are_surfaced_without_partial_result() {
        let mut mock = MockClusterClient::new();
        mock.expect_list_pods()
            .returning(|_, _| Err(Error::internal("forbidden")));
        let fetcher = ContainerFetcher::new(Arc::new(mock), cluster());

        assert!(fetcher.get_containers("risk", SELECTOR).await.is_err());
    }
}
