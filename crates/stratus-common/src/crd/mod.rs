//! Custom Resource Definitions for Stratus
//!
//! - [`Integration`] - a declared intent to run one third-party tool across
//!   a set of target clusters
//! - [`TargetCluster`] - a single remote cluster referenced by identity,
//!   with a pointer to its credential secret

pub mod integration;
pub mod target_cluster;
pub mod types;

pub use integration::{Integration, IntegrationSpec, IntegrationStatus};
pub use target_cluster::{SecretRef, TargetCluster, TargetClusterSpec, TargetClusterStatus};
pub use types::{IntegrationPhase, IntegrationType, TargetStatus, UnsupportedType};
