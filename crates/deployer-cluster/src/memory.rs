//! In-memory cluster client
//!
//! A [`ClusterClient`] backed by process memory that behaves like an
//! eventually-consistent API server: writes bump a resource version, stale
//! updates are rejected, newly created namespaces can stay invisible for a
//! few reads, and the serving platform's status population is simulated
//! after every write. Used by tests and dry runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus, Pod};
use kube::api::ObjectMeta;
use kube::ResourceExt;
use parking_lot::Mutex;

use deployer_common::Error;

use crate::client::ClusterClient;
use crate::resource::{InferenceService, InferenceServiceStatus, INFERENCE_SERVICE_KIND};

const NAMESPACE_KIND: &str = "Namespace";

/// Number of calls made per client operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `get_namespace` calls
    pub get_namespace: u32,
    /// `create_namespace` calls
    pub create_namespace: u32,
    /// `get_inference_service` calls
    pub get_service: u32,
    /// `create_inference_service` calls
    pub create_service: u32,
    /// `update_inference_service` calls
    pub update_service: u32,
    /// `delete_inference_service` calls
    pub delete_service: u32,
    /// `list_pods` calls
    pub list_pods: u32,
}

impl CallCounts {
    /// Total mutating calls
    pub fn writes(&self) -> u32 {
        self.create_namespace + self.create_service + self.update_service + self.delete_service
    }
}

struct StoredNamespace {
    object: Namespace,
    hidden_reads: u32,
}

struct StoredService {
    object: InferenceService,
    pending_status: Option<(InferenceServiceStatus, u32)>,
}

#[derive(Default)]
struct State {
    namespaces: BTreeMap<String, StoredNamespace>,
    services: BTreeMap<(String, String), StoredService>,
    pods: Vec<Pod>,
    next_version: u64,
    calls: CallCounts,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory [`ClusterClient`] implementation
#[derive(Default)]
pub struct MemoryClusterClient {
    state: Mutex<State>,
    namespace_propagation_reads: u32,
    serving_status: Option<InferenceServiceStatus>,
    status_delay_reads: u32,
}

impl MemoryClusterClient {
    /// Empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace in the given phase
    pub fn with_namespace(self, name: &str, phase: &str) -> Self {
        {
            let mut state = self.state.lock();
            let version = state.bump_version();
            state.namespaces.insert(
                name.to_string(),
                StoredNamespace {
                    object: namespace_object(name, phase, version),
                    hidden_reads: 0,
                },
            );
        }
        self
    }

    /// Keep newly created namespaces invisible for `reads` lookups
    pub fn with_namespace_propagation(mut self, reads: u32) -> Self {
        self.namespace_propagation_reads = reads;
        self
    }

    /// Status the simulated platform writes after every create or update
    pub fn with_serving_status(mut self, status: InferenceServiceStatus) -> Self {
        self.serving_status = Some(status);
        self
    }

    /// Delay the simulated status by `reads` lookups after each write
    pub fn with_status_delay(mut self, reads: u32) -> Self {
        self.status_delay_reads = reads;
        self
    }

    /// Seed a pod
    pub fn with_pod(self, pod: Pod) -> Self {
        self.add_pod(pod);
        self
    }

    /// Add a pod
    pub fn add_pod(&self, pod: Pod) {
        self.state.lock().pods.push(pod);
    }

    /// Store a serving resource as-is, assigning a fresh resource version
    pub fn insert_service(&self, mut isvc: InferenceService) {
        let mut state = self.state.lock();
        let key = (isvc.namespace().unwrap_or_default(), isvc.name_any());
        isvc.metadata.resource_version = Some(state.bump_version());
        state.services.insert(
            key,
            StoredService {
                object: isvc,
                pending_status: None,
            },
        );
    }

    /// Overwrite a serving resource's status as the platform would
    pub fn set_service_status(&self, namespace: &str, name: &str, status: InferenceServiceStatus) {
        let mut state = self.state.lock();
        let version = state.bump_version();
        if let Some(stored) = state
            .services
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            stored.object.status = Some(status);
            stored.object.metadata.resource_version = Some(version);
            stored.pending_status = None;
        }
    }

    /// Change a namespace's phase (e.g., to "Terminating")
    pub fn set_namespace_phase(&self, name: &str, phase: &str) {
        let mut state = self.state.lock();
        let version = state.bump_version();
        if let Some(stored) = state.namespaces.get_mut(name) {
            stored.object = namespace_object(name, phase, version);
        }
    }

    /// Current stored copy of a serving resource
    pub fn service(&self, namespace: &str, name: &str) -> Option<InferenceService> {
        self.state
            .lock()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .map(|s| s.object.clone())
    }

    /// Snapshot of call counters
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    fn pending_status(&self) -> Option<(InferenceServiceStatus, u32)> {
        self.serving_status
            .clone()
            .map(|status| (status, self.status_delay_reads))
    }
}

fn namespace_object(name: &str, phase: &str, version: String) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some(version),
            ..Default::default()
        },
        status: Some(NamespaceStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Apply a pending platform status once its delay has run out, stamped with
/// the generation it describes
fn settle_status(stored: &mut StoredService, version: impl FnOnce() -> String) {
    match stored.pending_status.take() {
        Some((mut status, 0)) => {
            status.observed_generation = stored.object.metadata.generation;
            stored.object.status = Some(status);
            stored.object.metadata.resource_version = Some(version());
        }
        Some((status, remaining)) => stored.pending_status = Some((status, remaining - 1)),
        None => {}
    }
}

#[async_trait]
impl ClusterClient for MemoryClusterClient {
    async fn get_namespace(&self, name: &str) -> Result<Option<Namespace>, Error> {
        let mut state = self.state.lock();
        state.calls.get_namespace += 1;
        match state.namespaces.get_mut(name) {
            Some(stored) if stored.hidden_reads > 0 => {
                stored.hidden_reads -= 1;
                Ok(None)
            }
            Some(stored) => Ok(Some(stored.object.clone())),
            None => Ok(None),
        }
    }

    async fn create_namespace(&self, name: &str) -> Result<Namespace, Error> {
        let mut state = self.state.lock();
        state.calls.create_namespace += 1;
        if state.namespaces.contains_key(name) {
            return Err(Error::conflict(NAMESPACE_KIND, "", name, "already exists"));
        }
        let version = state.bump_version();
        let object = namespace_object(name, "Active", version);
        state.namespaces.insert(
            name.to_string(),
            StoredNamespace {
                object: object.clone(),
                hidden_reads: self.namespace_propagation_reads,
            },
        );
        // The echo predates the phase the server assigns
        Ok(Namespace {
            status: None,
            ..object
        })
    }

    async fn get_inference_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<InferenceService>, Error> {
        let mut state = self.state.lock();
        state.calls.get_service += 1;
        let key = (namespace.to_string(), name.to_string());
        let Some(mut stored) = state.services.remove(&key) else {
            return Ok(None);
        };
        settle_status(&mut stored, || state.bump_version());
        let object = stored.object.clone();
        state.services.insert(key, stored);
        Ok(Some(object))
    }

    async fn create_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error> {
        let mut state = self.state.lock();
        state.calls.create_service += 1;
        let namespace = isvc.namespace().unwrap_or_default();
        let name = isvc.name_any();

        if !state.namespaces.contains_key(&namespace) {
            return Err(Error::not_found(NAMESPACE_KIND, "", namespace));
        }
        let key = (namespace.clone(), name.clone());
        if state.services.contains_key(&key) {
            return Err(Error::conflict(
                INFERENCE_SERVICE_KIND,
                namespace,
                name,
                "already exists",
            ));
        }

        let mut object = isvc.clone();
        object.metadata.resource_version = Some(state.bump_version());
        object.metadata.generation = Some(1);
        object.status = None;

        state.services.insert(
            key,
            StoredService {
                object: object.clone(),
                pending_status: self.pending_status(),
            },
        );
        Ok(object)
    }

    async fn update_inference_service(
        &self,
        isvc: &InferenceService,
    ) -> Result<InferenceService, Error> {
        let mut state = self.state.lock();
        state.calls.update_service += 1;
        let namespace = isvc.namespace().unwrap_or_default();
        let name = isvc.name_any();
        let key = (namespace.clone(), name.clone());

        let version = state.bump_version();
        let Some(stored) = state.services.get_mut(&key) else {
            return Err(Error::not_found(INFERENCE_SERVICE_KIND, namespace, name));
        };

        let current = stored.object.metadata.resource_version.clone();
        if isvc.metadata.resource_version.is_none() || isvc.metadata.resource_version != current {
            return Err(Error::conflict(
                INFERENCE_SERVICE_KIND,
                namespace,
                name,
                format!(
                    "stale resource version {:?}, current {:?}",
                    isvc.metadata.resource_version, current
                ),
            ));
        }

        let generation = stored.object.metadata.generation.unwrap_or(0);
        let mut object = isvc.clone();
        // Status is a subresource; writes to the main resource never change it
        object.status = stored.object.status.clone();
        object.metadata.resource_version = Some(version);
        object.metadata.generation = Some(if object.spec != stored.object.spec {
            generation + 1
        } else {
            generation
        });

        stored.object = object.clone();
        if let Some(pending) = self.pending_status() {
            stored.pending_status = Some(pending);
        }
        Ok(object)
    }

    async fn delete_inference_service(&self, namespace: &str, name: &str) -> Result<bool, Error> {
        let mut state = self.state.lock();
        state.calls.delete_service += 1;
        Ok(state
            .services
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some())
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, Error> {
        let selector = LabelSelector::parse(label_selector)?;
        let mut state = self.state.lock();
        state.calls.list_pods += 1;
        Ok(state
            .pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| selector.matches(pod.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }
}

/// One term of an equality-based label selector
#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    DoesNotExist(String),
}

/// Parsed comma-separated label selector (`k=v`, `k==v`, `k!=v`, `k`, `!k`)
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    /// Parse a selector string; an empty selector matches everything
    pub fn parse(selector: &str) -> Result<Self, Error> {
        let invalid = |term: &str| {
            Error::validation("labelSelector", format!("invalid term '{}' in '{}'", term, selector))
        };

        let mut requirements = Vec::new();
        for term in selector.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let requirement = if let Some((key, value)) = term.split_once("!=") {
                Requirement::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = term
                .split_once("==")
                .or_else(|| term.split_once('='))
            {
                Requirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else if let Some(key) = term.strip_prefix('!') {
                Requirement::DoesNotExist(key.trim().to_string())
            } else {
                Requirement::Exists(term.to_string())
            };

            let key = match &requirement {
                Requirement::Equals(k, _)
                | Requirement::NotEquals(k, _)
                | Requirement::Exists(k)
                | Requirement::DoesNotExist(k) => k,
            };
            if key.is_empty() {
                return Err(invalid(term));
            }
            requirements.push(requirement);
        }
        Ok(Self { requirements })
    }

    /// Whether a label set satisfies every term
    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        let get = |key: &str| labels.and_then(|l| l.get(key)).map(String::as_str);
        self.requirements.iter().all(|req| match req {
            Requirement::Equals(k, v) => get(k) == Some(v.as_str()),
            Requirement::NotEquals(k, v) => get(k) != Some(v.as_str()),
            Requirement::Exists(k) => get(k).is_some(),
            Requirement::DoesNotExist(k) => get(k).is_none(),
        })
    }
}
