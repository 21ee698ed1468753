//! Serving resource create-or-update
//!
//! Existence is always checked before writing, so a resource is never
//! created twice. Concurrent applies for the same resource are arbitrated by
//! the store's resource version check; the loser gets `Error::Conflict`.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, info};

use deployer_common::Error;

use crate::client::ClusterClient;
use crate::resource::InferenceService;

/// Which write an apply issued
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyAction {
    /// The resource did not exist and was created
    Created,
    /// The existing resource was updated in place
    Updated,
}

/// Idempotent create-or-update of InferenceServices
pub struct ServiceReconciler {
    client: Arc<dyn ClusterClient>,
}

impl ServiceReconciler {
    /// Create a reconciler over `client`
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Create `desired` if absent, otherwise update the existing object.
    ///
    /// On update only the spec and the desired labels are taken from
    /// `desired`; status, annotations and server-managed metadata stay as
    /// read, and the read resource version guards the write.
    pub async fn apply(
        &self,
        desired: &InferenceService,
    ) -> Result<(InferenceService, ApplyAction), Error> {
        let namespace = desired
            .namespace()
            .ok_or_else(|| Error::validation("metadata.namespace", "must be set"))?;
        let name = desired.name_any();

        match self.client.get_inference_service(&namespace, &name).await? {
            None => {
                let created = self.client.create_inference_service(desired).await?;
                info!(namespace = %namespace, name = %name, "created inference service");
                Ok((created, ApplyAction::Created))
            }
            Some(existing) => {
                debug!(
                    namespace = %namespace,
                    name = %name,
                    resource_version = ?existing.resource_version(),
                    "updating existing inference service"
                );
                let merged = merge_desired(existing, desired);
                let updated = self.client.update_inference_service(&merged).await?;
                info!(namespace = %namespace, name = %name, "updated inference service");
                Ok((updated, ApplyAction::Updated))
            }
        }
    }
}

/// Overlay the mutable parts of `desired` onto `existing`
fn merge_desired(mut existing: InferenceService, desired: &InferenceService) -> InferenceService {
    existing.spec = desired.spec.clone();
    if let Some(labels) = &desired.metadata.labels {
        existing
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    existing
}
