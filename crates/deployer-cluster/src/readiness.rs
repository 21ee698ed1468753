//! Readiness polling
//!
//! The platform populates status asynchronously with several conditions
//! that can disagree. [`interpret`] collapses them into one
//! [`DeploymentOutcome`] with a fixed priority: aggregate Ready, then
//! predictor failure, then routing failure.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use deployer_common::{poll_until, Deadline, Error, Polled};

use crate::client::ClusterClient;
use crate::resource::{
    ConditionStatus, InferenceServiceStatus, CONDITION_INGRESS_READY, CONDITION_PREDICTOR_READY,
    CONDITION_READY,
};

/// Terminal result of one deployment
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum DeploymentOutcome {
    /// Serving at the given URL
    Ready(String),
    /// The platform reported a failure
    Failed(String),
    /// No terminal condition before the deadline
    TimedOut,
}

impl DeploymentOutcome {
    /// Whether the deployment is serving
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl std::fmt::Display for DeploymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(url) => write!(f, "ready at {}", url),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

fn failure_reason(prefix: &str, message: Option<&str>) -> String {
    match message {
        Some(message) if !message.is_empty() => format!("{}: {}", prefix, message),
        _ => prefix.to_string(),
    }
}

/// Terminal outcome for a status, or `None` while still converging.
///
/// Ready without any URL is not terminal; the address is filled in later.
pub fn interpret(status: &InferenceServiceStatus) -> Option<DeploymentOutcome> {
    if status.condition_status(CONDITION_READY) == ConditionStatus::True {
        return status
            .reachable_url()
            .map(|url| DeploymentOutcome::Ready(url.to_string()));
    }

    for (condition, prefix) in [
        (CONDITION_PREDICTOR_READY, "predictor error"),
        (CONDITION_INGRESS_READY, "routes error"),
    ] {
        if let Some(c) = status.condition(condition) {
            if c.status == ConditionStatus::False {
                return Some(DeploymentOutcome::Failed(failure_reason(
                    prefix,
                    c.message.as_deref(),
                )));
            }
        }
    }

    None
}

/// Polls a serving resource until it reaches a terminal outcome
pub struct ReadinessPoller {
    client: Arc<dyn ClusterClient>,
    poll_interval: Duration,
}

impl ReadinessPoller {
    /// Create a poller reading status every `poll_interval`
    pub fn new(client: Arc<dyn ClusterClient>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Wait for `namespace/name` to become Ready or fail.
    ///
    /// Deadline expiry is an outcome (`TimedOut`), not an error. A resource
    /// that is briefly invisible counts as not ready yet.
    pub async fn wait_until_ready(
        &self,
        namespace: &str,
        name: &str,
        deadline: &Deadline,
    ) -> Result<DeploymentOutcome, Error> {
        let client = self.client.clone();
        let description = format!("inference service {}/{}", namespace, name);
        let polled = poll_until(deadline, self.poll_interval, &description, || {
            let client = client.clone();
            async move {
                let current = client.get_inference_service(namespace, name).await?;
                Ok(current
                    .and_then(|isvc| isvc.status)
                    .and_then(|status| interpret(&status)))
            }
        })
        .await?;

        let outcome = match polled {
            Polled::Done(outcome) => outcome,
            Polled::Expired => DeploymentOutcome::TimedOut,
        };
        match &outcome {
            DeploymentOutcome::Ready(url) => {
                info!(namespace = %namespace, name = %name, url = %url, "inference service ready")
            }
            DeploymentOutcome::Failed(reason) => {
                warn!(namespace = %namespace, name = %name, reason = %reason, "inference service failed")
            }
            DeploymentOutcome::TimedOut => warn!(
                namespace = %namespace,
                name = %name,
                timeout = ?deadline.timeout(),
                "inference service not ready before deadline"
            ),
        }
        Ok(outcome)
    }
}
