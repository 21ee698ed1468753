//! Error types for deployment reconciliation
//!
//! Every failure a reconciliation can hit maps to exactly one variant so
//! callers can branch on the category instead of parsing messages. Explicit
//! remote failures (predictor or routing errors) are not errors here; they
//! are reported as a `DeploymentOutcome`.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Compute dimension checked at admission time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceDimension {
    /// CPU, compared in millicores
    Cpu,
    /// Memory, compared in bytes
    Memory,
}

impl std::fmt::Display for ResourceDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Main error type for deployer operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (network, auth, server side)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A write targeted an object that does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g., "InferenceService")
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
    },

    /// Update rejected because the concurrency token was stale
    #[error("conflict updating {kind} {namespace}/{name}: {message}")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Namespace of the object
        namespace: String,
        /// Name of the object
        name: String,
        /// Message reported by the store
        message: String,
    },

    /// Requested compute exceeds the environment ceiling
    #[error("{dimension} request {requested} exceeds ceiling {ceiling} by {excess}")]
    QuotaExceeded {
        /// Which dimension was exceeded first
        dimension: ResourceDimension,
        /// Requested quantity as supplied
        requested: String,
        /// Ceiling quantity as configured
        ceiling: String,
        /// Amount over the ceiling (millicores for CPU, bytes for memory)
        excess: u64,
    },

    /// Target namespace cannot host workloads (e.g., it is terminating)
    #[error("namespace {namespace} is unavailable (phase {phase})")]
    NamespaceUnavailable {
        /// Namespace name
        namespace: String,
        /// Observed phase
        phase: String,
    },

    /// A wait ran out of time before reaching the expected state
    #[error("timed out after {timeout:?} waiting for {resource}")]
    ConvergenceTimeout {
        /// What was being waited on (e.g., "namespace my-project")
        resource: String,
        /// The budget that elapsed
        timeout: Duration,
    },

    /// The caller cancelled an in-flight wait
    #[error("cancelled while {context}")]
    Cancelled {
        /// What was in progress when cancellation arrived
        context: String,
    },

    /// Invalid input or configuration
    #[error("validation error for {field}: {message}")]
    Validation {
        /// The offending field path (e.g., "resources.cpuRequest")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a not-found error for a namespaced object
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error for a namespaced object
    pub fn conflict(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a namespace-unavailable error
    pub fn namespace_unavailable(namespace: impl Into<String>, phase: impl Into<String>) -> Self {
        Self::NamespaceUnavailable {
            namespace: namespace.into(),
            phase: phase.into(),
        }
    }

    /// Create a convergence timeout error
    pub fn convergence_timeout(resource: impl Into<String>, timeout: Duration) -> Self {
        Self::ConvergenceTimeout {
            resource: resource.into(),
            timeout,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(context: impl Into<String>) -> Self {
        Self::Cancelled {
            context: context.into(),
        }
    }

    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is worth retrying at a higher level
    ///
    /// This crate never retries on its own. The classification exists for
    /// callers that wrap `deploy` in their own retry loop.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                // 4xx means the request itself is wrong
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Conflict { .. } => true,
            Error::ConvergenceTimeout { .. } => true,
            Error::Internal { .. } => true,
            Error::NotFound { .. }
            | Error::QuotaExceeded { .. }
            | Error::NamespaceUnavailable { .. }
            | Error::Cancelled { .. }
            | Error::Validation { .. }
            | Error::Serialization { .. } => false,
        }
    }

    /// Check if the store rejected a write because of a stale token
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

/// Returns true when a kube error is an API response with the given status code
pub fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    /// Story: quota rejections name the dimension and the overshoot
    #[test]
    fn story_quota_error_names_dimension_and_excess() {
        let err = Error::QuotaExceeded {
            dimension: ResourceDimension::Cpu,
            requested: "10".to_string(),
            ceiling: "8".to_string(),
            excess: 2000,
        };
        let msg = err.to_string();
        assert!(msg.contains("cpu request 10"));
        assert!(msg.contains("ceiling 8"));
        assert!(msg.contains("by 2000"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn story_terminating_namespace_is_not_retryable() {
        let err = Error::namespace_unavailable("my-project", "Terminating");
        assert_eq!(
            err.to_string(),
            "namespace my-project is unavailable (phase Terminating)"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn story_conflicts_and_timeouts_are_retryable() {
        let err = Error::conflict("InferenceService", "ns", "svc", "stale resourceVersion");
        assert!(err.is_conflict());
        assert!(err.is_retryable());

        let err = Error::convergence_timeout("namespace ns", Duration::from_secs(2));
        assert!(err.to_string().contains("namespace ns"));
        assert!(err.is_retryable());
    }

    #[test]
    fn kube_client_errors_are_not_retryable_but_server_errors_are() {
        let err: Error = api_error(403).into();
        assert!(!err.is_retryable());

        let err: Error = api_error(503).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn api_status_matches_code() {
        assert!(is_api_status(&api_error(409), 409));
        assert!(!is_api_status(&api_error(404), 409));
    }

    #[test]
    fn internal_error_default_context() {
        let err = Error::internal("unexpected state");
        assert!(err.to_string().contains("[unknown]"));
        let err = Error::internal_with_context("readiness", "unexpected state");
        assert!(err.to_string().contains("[readiness]"));
    }
}
