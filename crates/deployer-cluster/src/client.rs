//! Cluster client seam
//!
//! Every remote call the reconcilers make goes through [`ClusterClient`].
//! Production uses [`KubeClusterClient`] against the API server; tests use
//! the in-memory implementation or a mockall mock.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use deployer_common::error::is_api_status;
use deployer_common::Error;

use crate::resource::{InferenceService, INFERENCE_SERVICE_KIND};

const NAMESPACE_KIND: &str = "Namespace";

/// Trait abstracting the declarative resource store
///
/// Getters return `Ok(None)` for absent objects; not-found is an expected
/// answer, not a failure. Updates must carry the resource version observed
/// on the last read and fail with [`Error::Conflict`] when it is stale.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Get a namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error>;

    /// Create a namespace
    async fn create_namespace(&self, name: &str) -> Result<Namespace, Error>;

    /// Get an InferenceService by namespace and name
    async fn get_inference_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InferenceService>, Error>;

    /// Create an InferenceService
    async fn create_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error>;

    /// Replace an InferenceService, guarded by its resource version
    async fn update_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error>;

    /// Delete an InferenceService; returns false when it did not exist
    async fn delete_inference_service(&self, namespace: &str, name: &str) -> Result<bool, Error>;

    /// List pods in a namespace matching a label selector
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClusterClient {
    client: Client,
    field_manager: String,
}

impl KubeClusterClient {
    /// Create a new KubeClusterClient wrapping the given client
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        }
    }
}

/// Namespace and name of an InferenceService, failing when either is unset
fn object_key(isvc: &InferenceService) -> Result<(String, String), Error> {
    let namespace = isvc
        .namespace()
        .ok_or_else(|| Error::validation("metadata.namespace", "must be set"))?;
    let name = isvc
        .metadata
        .name
        .clone()
        .ok_or_else(|| Error::validation("metadata.name", "must be set"))?;
    Ok((namespace, name))
}

/// Translate write errors into the conflict/not-found taxonomy
fn map_write_error(err: kube::Error, kind: &str, namespace: &str, name: &str) -> Error {
    if is_api_status(&err, 409) {
        let message = match &err {
            kube::Error::Api(ae) => ae.message.clone(),
            other => other.to_string(),
        };
        Error::conflict(kind, namespace, name, message)
    } else if is_api_status(&err, 404) {
        Error::not_found(kind, namespace, name)
    } else {
        err.into()
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        Ok(api.get_opt(name).await?)
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let ns = Namespace {
            metadata: kube::api::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let created = api
            .create(&self.post_params(), &ns)
            .await
            .map_err(|e| map_write_error(e, NAMESPACE_KIND, "", name))?;
        debug!(namespace = %name, "created namespace");
        Ok(created)
    }

    async fn get_inference_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InferenceService>, Error> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error> {
        let (namespace, name) = object_key(isvc)?;
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), &namespace);
        api.create(&self.post_params(), isvc)
            .await
            .map_err(|e| map_write_error(e, INFERENCE_SERVICE_KIND, &namespace, &name))
    }

    async fn update_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error> {
        let (namespace, name) = object_key(isvc)?;
        if isvc.resource_version().is_none() {
            return Err(Error::validation(
                "metadata.resourceVersion",
                "updates must carry the last observed resource version",
            ));
        }
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &self.post_params(), isvc)
            .await
            .map_err(|e| map_write_error(e, INFERENCE_SERVICE_KIND, &namespace, &name))
    }

    async fn delete_inference_service(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let api: Api<InferenceService> = Api::namespaced(self.client.clone(), namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(e) if is_api_status(&e, 404) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(label_selector);
        let list = api.list(&params).await?;
        Ok(list.items)
    }
}
