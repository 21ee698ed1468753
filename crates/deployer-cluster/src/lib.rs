//! Reconciliation core for model serving deployments
//!
//! Drives a desired deployment into a running InferenceService: validates
//! compute against environment ceilings, ensures the namespace is Active,
//! creates or updates the serving resource and polls its status conditions
//! into a single [`DeploymentOutcome`]. All cluster access goes through the
//! [`ClusterClient`] trait.

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod memory;
pub mod namespace;
pub mod pods;
pub mod quota;
pub mod readiness;
pub mod request;
pub mod resource;
pub mod service;
pub mod spec_builder;

pub use client::{ClusterClient, KubeClusterClient};
pub use controller::Controller;
pub use memory::{CallCounts, LabelSelector, MemoryClusterClient};
pub use namespace::{NamespacePhase, NamespaceReconciler, NamespaceState};
pub use pods::{ContainerFetcher, ContainerInfo, PodLister, PodSnapshot, PodSummary};
pub use quota::ResourceQuotaValidator;
pub use readiness::{interpret, DeploymentOutcome, ReadinessPoller};
pub use request::{serving_resource_name, ContainerOverrides, DeploymentRequest};
pub use resource::{InferenceService, InferenceServiceSpec, InferenceServiceStatus};
pub use service::{ApplyAction, ServiceReconciler};
pub use spec_builder::{build_inference_service, managed_labels, pod_selector};
