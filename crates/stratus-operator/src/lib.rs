//! Stratus operator - multi-cluster integration health control plane
//!
//! Stratus watches two cluster-scoped CRDs:
//! - `TargetCluster` resolves remote-cluster credentials into live
//!   connection handles held by the in-memory [`registry`]
//! - `Integration` declares that one third-party tool must be installed
//!   and healthy across a set of target clusters; its reconciler fans out
//!   type-specific [`probe`]s and aggregates the outcomes into one phase
//!
//! # Modules
//!
//! - [`registry`] - cluster connection registry and health monitor
//! - [`probe`] - per-integration-type workload health checks
//! - [`controller`] - Integration and TargetCluster reconcilers
//! - [`controller_runner`] - controller future construction for `main`

#![deny(missing_docs)]

pub mod controller;
pub mod controller_runner;
pub mod probe;
pub mod registry;

pub use stratus_common::{Error, Result};

/// Default interval between health-monitor rounds, in seconds
pub const DEFAULT_HEALTH_INTERVAL_SECS: u64 = 60;

/// Default per-cluster probe timeout, in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default registry staleness eviction age, in seconds
///
/// Several missed health rounds: an unreachable cluster is first marked
/// Error and only evicted once it has been silent this long.
pub const DEFAULT_STALE_MAX_AGE_SECS: u64 = 600;

/// Overall deadline for one Integration reconciliation pass, in seconds
///
/// A pass that exceeds this is abandoned without persisting partial
/// results; the next scheduled trigger retries from scratch.
pub const DEFAULT_PASS_DEADLINE_SECS: u64 = 120;

/// Upper bound on concurrent per-cluster probes within one fan-out
pub const PROBE_CONCURRENCY: usize = 8;
