//! Namespace readiness
//!
//! Ensures the target namespace exists and is Active before any serving
//! resource is written into it.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use tracing::{debug, info};

use deployer_common::{poll_until, Deadline, Error, Polled};

use crate::client::ClusterClient;

/// Lifecycle phase of a namespace as observed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespacePhase {
    /// Usable for workloads
    Active,
    /// Being deleted; cannot host new workloads
    Terminating,
    /// Present but no phase reported yet
    Pending,
    /// Not visible in the store
    NotFound,
}

impl NamespacePhase {
    /// Phase of a namespace object, or `NotFound` when absent
    pub fn of(namespace: Option<&Namespace>) -> Self {
        let Some(namespace) = namespace else {
            return Self::NotFound;
        };
        match namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
        {
            Some("Active") => Self::Active,
            Some("Terminating") => Self::Terminating,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for NamespacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Pending => write!(f, "Pending"),
            Self::NotFound => write!(f, "NotFound"),
        }
    }
}

/// Observed namespace state
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceState {
    /// Namespace name
    pub name: String,
    /// Observed phase
    pub phase: NamespacePhase,
}

/// Creates namespaces on demand and waits for them to become Active
pub struct NamespaceReconciler {
    client: Arc<dyn ClusterClient>,
    poll_interval: Duration,
}

impl NamespaceReconciler {
    /// Create a reconciler polling at `poll_interval`
    pub fn new(client: Arc<dyn ClusterClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Ensure `name` exists and is Active within `deadline`.
    ///
    /// An Active namespace returns without polling. A Terminating one fails
    /// at once with `NamespaceUnavailable`. An absent one is created and
    /// then re-read each tick; absence after create means the write has not
    /// propagated yet.
    pub async fn ensure_ready(&self, name: &str, deadline: &Deadline) -> Result<NamespaceState, Error> {
        let existing = self.client.get_namespace(name).await?;
        match NamespacePhase::of(existing.as_ref()) {
            NamespacePhase::Active => {
                debug!(namespace = %name, "namespace already active");
                return Ok(NamespaceState {
                    name: name.to_string(),
                    phase: NamespacePhase::Active,
                });
            }
            NamespacePhase::Terminating => {
                return Err(Error::namespace_unavailable(
                    name,
                    NamespacePhase::Terminating.to_string(),
                ));
            }
            NamespacePhase::NotFound => match self.client.create_namespace(name).await {
                Ok(_) => info!(namespace = %name, "created namespace"),
                // Lost a create race; the winner's namespace is just as good
                Err(e) if e.is_conflict() => {
                    debug!(namespace = %name, "namespace created concurrently")
                }
                Err(e) => return Err(e),
            },
            NamespacePhase::Pending => {}
        }

        let client = self.client.clone();
        let polled = poll_until(deadline, self.poll_interval, &format!("namespace {}", name), || {
            let client = client.clone();
            async move {
                let current = client.get_namespace(name).await?;
                match NamespacePhase::of(current.as_ref()) {
                    NamespacePhase::Active => Ok(Some(())),
                    NamespacePhase::Terminating => Err(Error::namespace_unavailable(
                        name,
                        NamespacePhase::Terminating.to_string(),
                    )),
                    NamespacePhase::Pending | NamespacePhase::NotFound => Ok(None),
                }
            }
        })
        .await?;

        match polled {
            Polled::Done(()) => {
                info!(namespace = %name, "namespace active");
                Ok(NamespaceState {
                    name: name.to_string(),
                    phase: NamespacePhase::Active,
                })
            }
            Polled::Expired => Err(Error::convergence_timeout(
                format!("namespace {}", name),
                deadline.timeout(),
            )),
        }
    }
}
