//! Common types for Stratus: CRDs, errors, metrics, telemetry, and events

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace for Stratus system resources (operator, credential secrets)
pub const STRATUS_SYSTEM_NAMESPACE: &str = "stratus-system";

/// Field manager name used for server-side apply patches
pub const FIELD_MANAGER: &str = "stratus-controller";

/// Secret key under which target-cluster kubeconfig material is stored
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";
