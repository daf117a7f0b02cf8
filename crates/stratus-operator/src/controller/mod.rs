//! Kubernetes controller reconciliation logic
//!
//! - [`integration`] - the Integration state machine and status aggregation
//! - [`target`] - TargetCluster registration and readiness reporting

pub mod integration;
pub mod target;

pub use integration::{error_policy, reconcile, Context};
pub use target::{
    error_policy as target_error_policy, reconcile as target_reconcile, TargetContext,
};
