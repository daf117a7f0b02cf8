//! Cluster health monitor
//!
//! Periodically (and on demand) probes each registered cluster's API
//! reachability and basic inventory, updating the registry. Probes are
//! independently time-bounded and run concurrently, so one hanging
//! cluster never delays results for the clusters that responded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::Api;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use stratus_common::{metrics, Error, Result};

use super::{ClusterConnection, ClusterRegistry};
use crate::{DEFAULT_PROBE_TIMEOUT_SECS, PROBE_CONCURRENCY};

/// Probes registered clusters and keeps the registry's health state fresh
pub struct HealthMonitor {
    registry: Arc<ClusterRegistry>,
    probe_timeout: Duration,
}

impl HealthMonitor {
    /// Create a monitor over the given registry with the default timeout
    pub fn new(registry: Arc<ClusterRegistry>) -> Self {
        Self {
            registry,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }

    /// Override the per-probe timeout
    pub fn with_probe_timeout(mut self, probe_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self
    }

    /// Probe one cluster and record the outcome in the registry
    ///
    /// On success the entry becomes Active with fresh version/node-count/
    /// last-seen. On failure the entry is marked Error but retained:
    /// cluster unreachability is an expected, recoverable condition.
    #[instrument(skip(self))]
    pub async fn refresh(&self, name: &str) -> Result<()> {
        let conn = self
            .registry
            .get(name)
            .ok_or_else(|| Error::not_registered(name))?;

        match self.probe(&conn).await {
            Ok((version, node_count)) => {
                debug!(cluster = %name, %version, node_count, "cluster probe succeeded");
                metrics::set_cluster_connection_status(name, true);
                self.registry
                    .update(name, |c| c.mark_active(&version, node_count))
            }
            Err(e) => {
                warn!(cluster = %name, error = %e, "cluster probe failed");
                metrics::set_cluster_connection_status(name, false);
                // Entry retained; a concurrent deregistration wins
                let _ = self.registry.update(name, |c| c.mark_error());
                Err(e)
            }
        }
    }

    /// One discovery-API version check plus one node inventory list
    async fn probe(&self, conn: &ClusterConnection) -> Result<(String, u32)> {
        let client = conn.client();

        let version = timeout(self.probe_timeout, client.apiserver_version())
            .await
            .map_err(|_| {
                Error::connectivity(
                    &conn.name,
                    format!("version probe timed out after {:?}", self.probe_timeout),
                )
            })?
            .map_err(|e| Error::connectivity(&conn.name, format!("version probe failed: {e}")))?;

        let nodes: Api<Node> = Api::all(client);
        let inventory = timeout(self.probe_timeout, nodes.list(&ListParams::default()))
            .await
            .map_err(|_| {
                Error::connectivity(
                    &conn.name,
                    format!("node inventory timed out after {:?}", self.probe_timeout),
                )
            })?
            .map_err(|e| Error::connectivity(&conn.name, format!("node inventory failed: {e}")))?;

        Ok((version.git_version, inventory.items.len() as u32))
    }

    /// Refresh every registered cluster concurrently
    ///
    /// Returns a cluster → reachability map. The fan-out is bounded and
    /// each probe independently time-bounded; clusters that responded are
    /// reported regardless of how the slow ones fare.
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let names: Vec<String> = self.registry.list().into_iter().map(|c| c.name).collect();

        futures::stream::iter(names)
            .map(|name| async move {
                let reachable = self.refresh(&name).await.is_ok();
                (name, reachable)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await
    }

    /// Background loop: health round plus staleness eviction each tick
    ///
    /// Runs until the surrounding task is dropped; `main` spawns this next
    /// to the controller futures.
    pub async fn run(&self, interval: Duration, max_age: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(?interval, ?max_age, "health monitor started");

        loop {
            ticker.tick().await;
            let results = self.health_check_all().await;
            let reachable = results.values().filter(|ok| **ok).count();
            debug!(
                total = results.len(),
                reachable, "health monitor round complete"
            );

            let evicted = self.registry.evict_stale(max_age);
            if !evicted.is_empty() {
                info!(count = evicted.len(), clusters = ?evicted, "evicted stale clusters");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::register_sample;
    use crate::registry::ConnectionState;

    fn fast_monitor(registry: Arc<ClusterRegistry>) -> HealthMonitor {
        // 127.0.0.1 probes fail on connect; the timeout is just a backstop
        HealthMonitor::new(registry).with_probe_timeout(Duration::from_millis(250))
    }

    #[tokio::test]
    async fn refresh_unknown_cluster_is_not_registered() {
        let registry = Arc::new(ClusterRegistry::new());
        let monitor = fast_monitor(registry);

        let err = monitor.refresh("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotRegistered { ref cluster } if cluster == "ghost"));
    }

    #[tokio::test]
    async fn failed_probe_marks_error_and_retains_entry() {
        let registry = Arc::new(ClusterRegistry::new());
        register_sample(&registry, "unreachable").await;
        let monitor = fast_monitor(registry.clone());

        let err = monitor.refresh("unreachable").await.unwrap_err();
        assert!(matches!(err, Error::Connectivity { ref cluster, .. } if cluster == "unreachable"));

        let conn = registry.get("unreachable").expect("entry retained");
        assert_eq!(conn.state, ConnectionState::Error);
    }

    #[tokio::test]
    async fn health_check_all_reports_every_cluster() {
        let registry = Arc::new(ClusterRegistry::new());
        for name in ["c1", "c2", "c3"] {
            register_sample(&registry, name).await;
        }
        let monitor = fast_monitor(registry.clone());

        let results = monitor.health_check_all().await;

        assert_eq!(results.len(), 3);
        // Nothing is listening on the sample endpoints
        assert!(results.values().all(|reachable| !reachable));
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn health_check_all_on_empty_registry_is_empty() {
        let registry = Arc::new(ClusterRegistry::new());
        let monitor = fast_monitor(registry);
        assert!(monitor.health_check_all().await.is_empty());
    }

    /// Concurrent health rounds must never corrupt the registry: 50
    /// simultaneous sweeps over 100 registered clusters end with all 100
    /// entries intact and a complete reachability map from each sweep.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_health_rounds_do_not_corrupt_registry() {
        let registry = Arc::new(ClusterRegistry::new());
        for i in 0..100 {
            register_sample(&registry, &format!("cluster-{i:03}")).await;
        }
        let monitor = Arc::new(fast_monitor(registry.clone()));

        let sweeps = (0..50).map(|_| {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.health_check_all().await })
        });
        let results = futures::future::join_all(sweeps).await;

        for result in results {
            let map = result.expect("sweep must not panic");
            assert_eq!(map.len(), 100);
        }
        assert_eq!(registry.len(), 100, "no entries lost");
    }
}
