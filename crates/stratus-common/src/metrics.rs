//! Metrics registry for Stratus observability
//!
//! Provides OpenTelemetry metrics for:
//! - Integration reconciliation (outcome counts, pass duration)
//! - Per-cluster sync probes (operation counts, latency)
//! - Integration and cluster-connection status gauges
//!
//! The metrics surface is an external sink: the reconciler calls into it
//! and the OTLP exporter configured in [`crate::telemetry`] ships it out.

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};

/// Global meter for Stratus metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("stratus"));

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Counter of Integration reconciliation passes
///
/// Labels:
/// - `integration`: Integration name
/// - `type`: integration type (argocd, flux, prometheus, istio)
/// - `status`: success, error
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("stratus_reconcile_total")
        .with_description("Total number of Integration reconciliation passes")
        .with_unit("{passes}")
        .build()
});

/// Histogram of Integration reconciliation pass duration
///
/// Labels:
/// - `integration`: Integration name
/// - `type`: integration type
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("stratus_reconcile_duration_seconds")
        .with_description("Duration of Integration reconciliation passes in seconds")
        .with_unit("s")
        .build()
});

// ============================================================================
// Per-Cluster Sync Metrics
// ============================================================================

/// Counter of per-target-cluster probe operations
///
/// Labels:
/// - `integration`: Integration name
/// - `cluster`: target cluster name
/// - `status`: success, error
pub static SYNC_OPERATIONS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("stratus_sync_operations_total")
        .with_description("Total number of per-cluster probe operations")
        .with_unit("{operations}")
        .build()
});

/// Histogram of per-target-cluster probe latency
///
/// Labels:
/// - `integration`: Integration name
/// - `cluster`: target cluster name
pub static SYNC_LATENCY: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("stratus_sync_latency_seconds")
        .with_description("Latency of per-cluster probe operations in seconds")
        .with_unit("s")
        .build()
});

// ============================================================================
// Status Gauges
// ============================================================================

/// Gauge of per-target integration health (1 ready, 0 not ready)
///
/// Labels:
/// - `integration`: Integration name
/// - `type`: integration type
/// - `cluster`: target cluster name
pub static INTEGRATION_STATUS: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("stratus_integration_status")
        .with_description("Per-target integration health (1 ready, 0 not ready)")
        .with_unit("{status}")
        .build()
});

/// Gauge of cluster connection health (1 reachable, 0 not)
///
/// Labels:
/// - `cluster`: cluster name
pub static CLUSTER_CONNECTION_STATUS: Lazy<Gauge<i64>> = Lazy::new(|| {
    METER
        .i64_gauge("stratus_cluster_connection_status")
        .with_description("Cluster connection health (1 reachable, 0 not)")
        .with_unit("{status}")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// Outcome label for counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Operation completed
    Success,
    /// Operation failed or timed out
    Error,
}

impl Outcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Times one Integration reconciliation pass
pub struct ReconcileTimer {
    integration: String,
    type_label: String,
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation pass
    pub fn start(integration: impl Into<String>, type_label: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            type_label: type_label.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Record the pass outcome and duration
    pub fn finish(self, outcome: Outcome) {
        let duration = self.start.elapsed().as_secs_f64();
        RECONCILE_TOTAL.add(
            1,
            &[
                KeyValue::new("integration", self.integration.clone()),
                KeyValue::new("type", self.type_label.clone()),
                KeyValue::new("status", outcome.as_str()),
            ],
        );
        RECONCILE_DURATION.record(
            duration,
            &[
                KeyValue::new("integration", self.integration),
                KeyValue::new("type", self.type_label),
            ],
        );
    }
}

/// Times one per-cluster probe within a reconciliation fan-out
pub struct SyncTimer {
    integration: String,
    cluster: String,
    start: std::time::Instant,
}

impl SyncTimer {
    /// Start timing a probe against one target cluster
    pub fn start(integration: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            cluster: cluster.into(),
            start: std::time::Instant::now(),
        }
    }

    /// Record the probe outcome and latency
    pub fn finish(self, outcome: Outcome) {
        let latency = self.start.elapsed().as_secs_f64();
        SYNC_OPERATIONS_TOTAL.add(
            1,
            &[
                KeyValue::new("integration", self.integration.clone()),
                KeyValue::new("cluster", self.cluster.clone()),
                KeyValue::new("status", outcome.as_str()),
            ],
        );
        SYNC_LATENCY.record(
            latency,
            &[
                KeyValue::new("integration", self.integration),
                KeyValue::new("cluster", self.cluster),
            ],
        );
    }
}

/// Update the per-target integration health gauge
pub fn set_integration_status(integration: &str, type_label: &str, cluster: &str, ready: bool) {
    INTEGRATION_STATUS.record(
        i64::from(ready),
        &[
            KeyValue::new("integration", integration.to_string()),
            KeyValue::new("type", type_label.to_string()),
            KeyValue::new("cluster", cluster.to_string()),
        ],
    );
}

/// Update the cluster connection health gauge
pub fn set_cluster_connection_status(cluster: &str, reachable: bool) {
    CLUSTER_CONNECTION_STATUS.record(
        i64::from(reachable),
        &[KeyValue::new("cluster", cluster.to_string())],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_as_str() {
        assert_eq!(Outcome::Success.as_str(), "success");
        assert_eq!(Outcome::Error.as_str(), "error");
    }

    #[test]
    fn reconcile_timer_records_without_panic() {
        let timer = ReconcileTimer::start("gitops", "argocd");
        assert_eq!(timer.integration, "gitops");
        timer.finish(Outcome::Success);
    }

    #[test]
    fn sync_timer_records_without_panic() {
        let timer = SyncTimer::start("gitops", "prod-us-west");
        assert_eq!(timer.cluster, "prod-us-west");
        timer.finish(Outcome::Error);
    }

    #[test]
    fn gauges_record_without_panic() {
        set_integration_status("mesh", "istio", "edge-1", true);
        set_integration_status("mesh", "istio", "edge-2", false);
        set_cluster_connection_status("edge-1", true);
    }
}
