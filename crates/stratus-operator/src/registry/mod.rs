//! Cluster connection registry
//!
//! The registry is the single shared mutable resource in the operator: a
//! map from cluster identity to its live connection handle and last-known
//! health. One reader/writer lock guards the whole registry instance (not
//! one lock per entry), and every read hands back a cloned snapshot so
//! callers never hold references into the map across await points.

mod credentials;
pub mod health;

pub use credentials::{client_from_kubeconfig, kubeconfig_from_secret};

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use kube::Client;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use stratus_common::{Error, Result};

/// Health state of one registered cluster connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Registered, last probe succeeded
    Active,
    /// Registered, no probe has completed yet
    #[default]
    Connecting,
    /// Registered, last probe failed; entry retained for retry
    Error,
    /// Explicitly deregistered (terminal, snapshot-only state)
    Disconnected,
}

impl ConnectionState {
    /// Label value for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Connecting => "connecting",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        }
    }

    /// Whether the cluster was reachable at last probe
    pub fn is_up(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A live connection to one remote cluster
///
/// Owned exclusively by the [`ClusterRegistry`]; mutated only through
/// registry methods under its lock. Values handed to callers are clones
/// (the embedded [`Client`] is a cheap handle).
#[derive(Clone)]
pub struct ClusterConnection {
    /// Cluster identity (registry key)
    pub name: String,
    /// Namespace of the credential secret this connection was built from
    pub secret_namespace: String,
    client: Client,
    /// Kubernetes server version from the last successful probe
    pub server_version: Option<String>,
    /// Node count from the last successful probe
    pub node_count: Option<u32>,
    /// Current health state
    pub state: ConnectionState,
    /// Last time this entry was successfully probed or registered
    pub last_seen: DateTime<Utc>,
    /// Arbitrary labels, queryable via [`ClusterRegistry::list_by_label`]
    pub labels: BTreeMap<String, String>,
    /// Capability tags (set semantics, no duplicates)
    pub capabilities: BTreeSet<String>,
}

impl ClusterConnection {
    /// Create a connection in the Connecting state
    pub fn new(name: impl Into<String>, secret_namespace: impl Into<String>, client: Client) -> Self {
        Self {
            name: name.into(),
            secret_namespace: secret_namespace.into(),
            client,
            server_version: None,
            node_count: None,
            state: ConnectionState::Connecting,
            last_seen: Utc::now(),
            labels: BTreeMap::new(),
            capabilities: BTreeSet::new(),
        }
    }

    /// Attach labels, replacing any existing set
    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Attach capability tags, replacing any existing set
    pub fn with_capabilities(mut self, capabilities: BTreeSet<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The API client handle for this cluster
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Record a successful probe
    pub fn mark_active(&mut self, server_version: impl Into<String>, node_count: u32) {
        self.server_version = Some(server_version.into());
        self.node_count = Some(node_count);
        self.state = ConnectionState::Active;
        self.last_seen = Utc::now();
    }

    /// Record a failed probe; discovery data from earlier probes is kept
    pub fn mark_error(&mut self) {
        self.state = ConnectionState::Error;
    }
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("server_version", &self.server_version)
            .field("node_count", &self.node_count)
            .field("last_seen", &self.last_seen)
            .finish_non_exhaustive()
    }
}

/// Thread-safe store of live cluster connections
///
/// Read-heavy traffic (status lookups during probe fan-out) runs under the
/// shared lock; registration, credential rotation, and staleness eviction
/// take the exclusive lock. Lock scopes never span an await.
#[derive(Default)]
pub struct ClusterRegistry {
    inner: RwLock<HashMap<String, ClusterConnection>>,
}

impl ClusterRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse credential material and install a connection for `name`
    ///
    /// Malformed credentials are reported to the caller and no entry is
    /// installed. Re-registering an existing name replaces its entry,
    /// which is how credential rotation takes effect.
    pub async fn register(
        &self,
        name: &str,
        secret_namespace: &str,
        kubeconfig: &[u8],
        labels: BTreeMap<String, String>,
        capabilities: BTreeSet<String>,
    ) -> Result<()> {
        let client = client_from_kubeconfig(name, kubeconfig).await?;
        let connection = ClusterConnection::new(name, secret_namespace, client)
            .with_labels(labels)
            .with_capabilities(capabilities);
        let replaced = self
            .inner
            .write()
            .insert(name.to_string(), connection)
            .is_some();
        info!(cluster = %name, replaced, "cluster registered");
        Ok(())
    }

    /// Snapshot of one connection, or None if the identity is unknown
    pub fn get(&self, name: &str) -> Option<ClusterConnection> {
        self.inner.read().get(name).cloned()
    }

    /// Remove a connection; returns the evicted snapshot if present
    pub fn remove(&self, name: &str) -> Option<ClusterConnection> {
        let removed = self.inner.write().remove(name);
        match removed {
            Some(mut conn) => {
                info!(cluster = %name, "cluster deregistered");
                conn.state = ConnectionState::Disconnected;
                Some(conn)
            }
            None => {
                debug!(cluster = %name, "deregistration for unknown cluster ignored");
                None
            }
        }
    }

    /// Snapshot of all connections, sorted by name for deterministic output
    pub fn list(&self) -> Vec<ClusterConnection> {
        let mut entries: Vec<_> = self.inner.read().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Snapshot of connections carrying the given label key/value
    pub fn list_by_label(&self, key: &str, value: &str) -> Vec<ClusterConnection> {
        let mut entries: Vec<_> = self
            .inner
            .read()
            .values()
            .filter(|c| c.labels.get(key).is_some_and(|v| v == value))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether the registry holds no connections
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Mutate one entry under the write lock
    ///
    /// Returns an error when the identity is unknown so probe results for
    /// a concurrently deregistered cluster are dropped, not resurrected.
    pub fn update(
        &self,
        name: &str,
        f: impl FnOnce(&mut ClusterConnection),
    ) -> Result<()> {
        match self.inner.write().get_mut(name) {
            Some(conn) => {
                f(conn);
                Ok(())
            }
            None => {
                warn!(cluster = %name, "update for unknown cluster ignored");
                Err(Error::not_registered(name))
            }
        }
    }

    /// Remove entries whose last-seen precedes `now - max_age`
    ///
    /// Returns the names of the evicted entries; all others are untouched.
    pub fn evict_stale(&self, max_age: Duration) -> Vec<String> {
        let cutoff = match chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            // A max_age beyond the representable range makes nothing stale
            None => return Vec::new(),
        };
        let mut evicted = Vec::new();
        {
            let mut inner = self.inner.write();
            inner.retain(|name, conn| {
                if conn.last_seen < cutoff {
                    evicted.push(name.clone());
                    false
                } else {
                    true
                }
            });
        }
        evicted.sort();
        for name in &evicted {
            info!(cluster = %name, "stale cluster evicted");
        }
        evicted
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn register_and_get_round_trip() {
        let registry = ClusterRegistry::new();
        register_sample(&registry, "prod-us-west").await;

        let conn = registry.get("prod-us-west").expect("registered cluster");
        assert_eq!(conn.name, "prod-us-west");
        assert_eq!(conn.state, ConnectionState::Connecting);
        assert!(registry.get("other").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn malformed_credentials_install_nothing() {
        let registry = ClusterRegistry::new();
        let result = registry
            .register(
                "bad",
                "stratus-system",
                b"not: [valid, kubeconfig",
                BTreeMap::new(),
                BTreeSet::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::Credentials { ref cluster, .. }) if cluster == "bad"
        ));
        assert!(registry.is_empty(), "no partial state on rejected credentials");
    }

    #[tokio::test]
    async fn snapshots_are_copies_not_references() {
        let registry = ClusterRegistry::new();
        register_sample(&registry, "c1").await;

        let mut snapshot = registry.get("c1").unwrap();
        snapshot.mark_active("v9.99.9", 42);

        // Mutating the snapshot must not leak into the registry
        let fresh = registry.get("c1").unwrap();
        assert_eq!(fresh.state, ConnectionState::Connecting);
        assert!(fresh.server_version.is_none());
    }

    #[tokio::test]
    async fn re_registration_replaces_entry() {
        let registry = ClusterRegistry::new();
        register_sample(&registry, "c1").await;
        registry
            .update("c1", |c| c.mark_active("v1.31.0", 3))
            .unwrap();

        // Rotated credentials: same identity, fresh entry
        register_sample(&registry, "c1").await;
        let conn = registry.get("c1").unwrap();
        assert_eq!(conn.state, ConnectionState::Connecting);
        assert!(conn.server_version.is_none());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn list_by_label_filters() {
        let registry = ClusterRegistry::new();
        registry
            .register(
                "edge-1",
                "stratus-system",
                &sample_kubeconfig("edge-1", 1),
                BTreeMap::from([("region".to_string(), "eu".to_string())]),
                BTreeSet::new(),
            )
            .await
            .unwrap();
        registry
            .register(
                "edge-2",
                "stratus-system",
                &sample_kubeconfig("edge-2", 1),
                BTreeMap::from([("region".to_string(), "us".to_string())]),
                BTreeSet::new(),
            )
            .await
            .unwrap();

        let eu = registry.list_by_label("region", "eu");
        assert_eq!(eu.len(), 1);
        assert_eq!(eu[0].name, "edge-1");
        assert!(registry.list_by_label("region", "ap").is_empty());
    }

    #[tokio::test]
    async fn evict_stale_removes_exactly_the_stale_entries() {
        let registry = ClusterRegistry::new();
        for name in ["fresh-1", "fresh-2", "stale-1", "stale-2"] {
            register_sample(&registry, name).await;
        }

        // Age two entries past the cutoff
        let old = Utc::now() - chrono::Duration::seconds(3600);
        for name in ["stale-1", "stale-2"] {
            registry.update(name, |c| c.last_seen = old).unwrap();
        }
        let fresh_before = registry.get("fresh-1").unwrap();

        let evicted = registry.evict_stale(Duration::from_secs(600));

        assert_eq!(evicted, vec!["stale-1".to_string(), "stale-2".to_string()]);
        assert_eq!(registry.len(), 2);
        // Survivors are untouched
        let fresh_after = registry.get("fresh-1").unwrap();
        assert_eq!(fresh_after.state, fresh_before.state);
        assert_eq!(fresh_after.last_seen, fresh_before.last_seen);
    }

    #[tokio::test]
    async fn update_unknown_cluster_errors_without_panic() {
        let registry = ClusterRegistry::new();
        let result = registry.update("ghost", |c| c.mark_error());
        assert!(matches!(result, Err(Error::NotRegistered { .. })));

        // Registry still works after the miss
        register_sample(&registry, "real").await;
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn remove_marks_snapshot_disconnected() {
        let registry = ClusterRegistry::new();
        register_sample(&registry, "c1").await;

        let removed = registry.remove("c1").expect("entry existed");
        assert_eq!(removed.state, ConnectionState::Disconnected);
        assert!(registry.is_empty());
        assert!(registry.remove("c1").is_none());
    }

    /// Story: a fleet of clusters registers, degrades, and recovers
    ///
    /// Walks one entry through the full state surface the monitor drives:
    /// Connecting on registration, Active after a successful probe, Error
    /// on failure (entry retained), and finally eviction once stale.
    #[tokio::test]
    async fn story_connection_lifecycle() {
        let registry = ClusterRegistry::new();
        register_sample(&registry, "wobbly").await;
        assert_eq!(
            registry.get("wobbly").unwrap().state,
            ConnectionState::Connecting
        );

        registry
            .update("wobbly", |c| c.mark_active("v1.32.0", 7))
            .unwrap();
        let active = registry.get("wobbly").unwrap();
        assert!(active.state.is_up());
        assert_eq!(active.node_count, Some(7));

        registry.update("wobbly", |c| c.mark_error()).unwrap();
        let degraded = registry.get("wobbly").unwrap();
        assert_eq!(degraded.state, ConnectionState::Error);
        // Discovery data from the good probe survives the failure
        assert_eq!(degraded.server_version.as_deref(), Some("v1.32.0"));

        registry
            .update("wobbly", |c| {
                c.last_seen = Utc::now() - chrono::Duration::seconds(7200)
            })
            .unwrap();
        assert_eq!(registry.evict_stale(Duration::from_secs(600)).len(), 1);
        assert!(registry.is_empty());
    }
}
