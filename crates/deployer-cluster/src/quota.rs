//! Admission-time compute quota validation
//!
//! Requested values are per pod, so they are compared against the ceilings
//! directly without multiplying by replica count.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use deployer_common::quantity::{quantity_cpu_millis, quantity_memory_bytes};
use deployer_common::{DeploymentConfig, Error, ResourceDimension, ResourceProfile};

/// Per-environment CPU and memory ceilings
#[derive(Clone, Debug)]
pub struct ResourceQuotaValidator {
    max_cpu: Quantity,
    max_memory: Quantity,
    max_cpu_millis: u64,
    max_memory_bytes: u64,
}

impl ResourceQuotaValidator {
    /// Build a validator, failing if a ceiling does not parse
    pub fn new(max_cpu: Quantity, max_memory: Quantity) -> Result<Self, Error> {
        let max_cpu_millis = quantity_cpu_millis(&max_cpu)?;
        let max_memory_bytes = quantity_memory_bytes(&max_memory)?;
        Ok(Self {
            max_cpu,
            max_memory,
            max_cpu_millis,
            max_memory_bytes,
        })
    }

    /// Validator using the ceilings from a deployment config
    pub fn from_config(config: &DeploymentConfig) -> Result<Self, Error> {
        Self::new(config.max_cpu.clone(), config.max_memory.clone())
    }

    /// Check a profile; CPU is checked before memory
    pub fn validate(&self, profile: &ResourceProfile) -> Result<(), Error> {
        let cpu = quantity_cpu_millis(&profile.cpu_request)?;
        if cpu > self.max_cpu_millis {
            return Err(Error::QuotaExceeded {
                dimension: ResourceDimension::Cpu,
                requested: profile.cpu_request.0.clone(),
                ceiling: self.max_cpu.0.clone(),
                excess: cpu - self.max_cpu_millis,
            });
        }

        let memory = quantity_memory_bytes(&profile.memory_request)?;
        if memory > self.max_memory_bytes {
            return Err(Error::QuotaExceeded {
                dimension: ResourceDimension::Memory,
                requested: profile.memory_request.0.clone(),
                ceiling: self.max_memory.0.clone(),
                excess: memory - self.max_memory_bytes,
            });
        }

        Ok(())
    }
}
