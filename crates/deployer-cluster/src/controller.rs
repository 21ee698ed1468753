//! Deployment controller
//!
//! Composes quota validation, namespace readiness, spec building,
//! create-or-update and readiness polling into `deploy`, plus `undeploy`
//! and the read-only introspection calls. Every call reconciles against the
//! current remote state; nothing is cached between calls.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use deployer_common::{Deadline, DeploymentConfig, Error};

use crate::client::ClusterClient;
use crate::namespace::NamespaceReconciler;
use crate::pods::{ContainerFetcher, ContainerInfo, PodLister, PodSnapshot};
use crate::quota::ResourceQuotaValidator;
use crate::readiness::{interpret, DeploymentOutcome, ReadinessPoller};
use crate::request::DeploymentRequest;
use crate::resource::INFERENCE_SERVICE_KIND;
use crate::service::ServiceReconciler;
use crate::spec_builder::build_inference_service;

/// Entry point for deploying and inspecting model serving workloads
///
/// Safe to share across tasks; calls for different resources run
/// independently and calls for the same resource are arbitrated by the
/// store's resource version check.
pub struct Controller {
    client: Arc<dyn ClusterClient>,
    config: DeploymentConfig,
    quota: ResourceQuotaValidator,
    namespaces: NamespaceReconciler,
    services: ServiceReconciler,
    readiness: ReadinessPoller,
    pods: PodLister,
    containers: ContainerFetcher,
}

impl Controller {
    /// Create a controller, validating `config` first
    pub fn new(client: Arc<dyn ClusterClient>, config: DeploymentConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            quota: ResourceQuotaValidator::from_config(&config)?,
            namespaces: NamespaceReconciler::new(client.clone(), config.poll_interval),
            services: ServiceReconciler::new(client.clone()),
            readiness: ReadinessPoller::new(client.clone(), config.poll_interval),
            pods: PodLister::new(client.clone()),
            containers: ContainerFetcher::new(client.clone(), config.cluster.clone()),
            client,
            config,
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Deploy a request and wait for a terminal outcome
    pub async fn deploy(&self, request: &DeploymentRequest) -> Result<DeploymentOutcome, Error> {
        self.deploy_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Deploy, aborting any wait within one tick once `cancel` fires.
    ///
    /// `Ready`, `Failed` and `TimedOut` are all returned as outcomes. Errors
    /// mean the deployment could not be attempted or was interrupted: quota
    /// rejection (before any write), an unusable namespace, an API failure,
    /// a stale-version conflict or cancellation.
    #[instrument(
        skip(self, request, cancel),
        fields(namespace = %request.namespace, name = %request.name)
    )]
    pub async fn deploy_with_cancel(
        &self,
        request: &DeploymentRequest,
        cancel: CancellationToken,
    ) -> Result<DeploymentOutcome, Error> {
        let profile = request.resources_or(&self.config.default_resources);
        self.quota.validate(profile)?;

        let namespace_deadline = Deadline::with_cancel(self.config.namespace_timeout, cancel.clone());
        self.namespaces
            .ensure_ready(&request.namespace, &namespace_deadline)
            .await?;

        let desired = build_inference_service(request, profile);
        let (_, action) = self.services.apply(&desired).await?;
        info!(?action, "applied inference service");

        let deadline = Deadline::with_cancel(self.config.deployment_timeout, cancel);
        self.readiness
            .wait_until_ready(&request.namespace, &request.name, &deadline)
            .await
    }

    /// Delete the serving resource; returns false if it was already gone
    #[instrument(skip(self, request), fields(namespace = %request.namespace, name = %request.name))]
    pub async fn undeploy(&self, request: &DeploymentRequest) -> Result<bool, Error> {
        let deleted = self
            .client
            .delete_inference_service(&request.namespace, &request.name)
            .await?;
        if deleted {
            info!("deleted inference service");
        } else {
            info!("inference service already absent");
        }
        Ok(deleted)
    }

    /// Interpret the current status once without waiting.
    ///
    /// `Ok(None)` means the resource exists but has not reached a terminal
    /// state yet.
    pub async fn status(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DeploymentOutcome>, Error> {
        let isvc = self
            .client
            .get_inference_service(namespace, name)
            .await?
            .ok_or_else(|| Error::not_found(INFERENCE_SERVICE_KIND, namespace, name))?;
        Ok(isvc.status.as_ref().and_then(interpret))
    }

    /// Pods in `namespace` matching `label_selector`
    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<PodSnapshot, Error> {
        self.pods.list_pods(namespace, label_selector).await
    }

    /// Containers of pods in `namespace` matching `label_selector`
    pub async fn get_containers(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<ContainerInfo>, Error> {
        self.containers
            .get_containers(namespace, label_selector)
            .await
    }
}
