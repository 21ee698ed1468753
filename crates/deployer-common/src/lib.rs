//! Shared building blocks for deployer: errors, quantities, polling,
//! configuration and telemetry

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod poll;
pub mod quantity;
pub mod telemetry;

pub use config::{ClusterMetadata, DeploymentConfig, ResourceProfile};
pub use error::{Error, ResourceDimension};
pub use poll::{poll_until, Deadline, Polled, Tick};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key recording which tool manages a resource
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value for [`LABEL_MANAGED_BY`] on resources this crate writes
pub const LABEL_MANAGED_BY_DEPLOYER: &str = "deployer";
