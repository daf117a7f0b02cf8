//! TargetCluster controller implementation
//!
//! Resolves a target-cluster declaration into a live registry entry:
//! reads the referenced kubeconfig Secret, registers (or re-registers)
//! the connection, runs one health refresh, and reports Ready/NotReady
//! with a reason. Independent of Integration type; every Integration
//! referencing the cluster resolves it through the same registry entry.
//!
//! Credential rotation is picked up here: each pass re-reads the Secret
//! and re-registration replaces the connection handle. There is no watch
//! on the Secret itself, so rotation takes effect on the next periodic
//! pass or operator restart.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use stratus_common::crd::{TargetCluster, TargetClusterStatus};
use stratus_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use stratus_common::{Error, Result, FIELD_MANAGER};

use crate::registry::health::HealthMonitor;
use crate::registry::{kubeconfig_from_secret, ClusterRegistry};

/// Interval between scheduled passes once a cluster is registered
const REQUEUE_SECS: u64 = 60;
/// Backoff while the credential secret is missing or rejected
const CREDENTIALS_REQUEUE_SECS: u64 = 300;
/// Backoff before retrying a failed pass
const ERROR_REQUEUE_SECS: u64 = 5;

/// Trait abstracting Kubernetes operations for TargetCluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TargetApi: Send + Sync {
    /// Fetch a Secret, returning None when it does not exist
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>>;

    /// Overwrite the status of the named TargetCluster
    async fn patch_status(&self, name: &str, status: &TargetClusterStatus) -> Result<()>;
}

/// Real Kubernetes-backed implementation
pub struct TargetApiImpl {
    client: Client,
}

impl TargetApiImpl {
    /// Create an implementation wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetApi for TargetApiImpl {
    async fn get_secret(&self, name: &str, namespace: &str) -> Result<Option<Secret>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_status(&self, name: &str, status: &TargetClusterStatus) -> Result<()> {
        let api: Api<TargetCluster> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Shared context for the TargetCluster controller
pub struct TargetContext {
    /// Kubernetes seam (secret reads, status writes)
    pub api: Arc<dyn TargetApi>,
    /// Cluster connection registry (shared with the Integration controller)
    pub registry: Arc<ClusterRegistry>,
    /// Health monitor used for the post-registration refresh
    pub monitor: Arc<HealthMonitor>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
}

impl TargetContext {
    /// Production context backed by the given client and registry
    pub fn new(
        client: Client,
        registry: Arc<ClusterRegistry>,
        monitor: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            api: Arc::new(TargetApiImpl::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, "stratus-target-controller")),
            registry,
            monitor,
        }
    }

    /// Context with every seam supplied by the caller (primarily for tests)
    pub fn for_testing(
        api: Arc<dyn TargetApi>,
        registry: Arc<ClusterRegistry>,
        monitor: Arc<HealthMonitor>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            api,
            registry,
            monitor,
            events,
        }
    }
}

/// Reconcile one TargetCluster
#[instrument(skip(target, ctx), fields(cluster = %target.name_any()))]
pub async fn reconcile(target: Arc<TargetCluster>, ctx: Arc<TargetContext>) -> Result<Action> {
    let name = target.name_any();

    if target.metadata.deletion_timestamp.is_some() {
        info!("target cluster deleted, deregistering");
        ctx.registry.remove(&name);
        return Ok(Action::await_change());
    }

    debug!("reconciling target cluster");
    let secret_ref = &target.spec.secret_ref;

    let Some(secret) = ctx
        .api
        .get_secret(&secret_ref.name, &secret_ref.namespace)
        .await?
    else {
        let reason = format!(
            "credential secret {}/{} not found",
            secret_ref.namespace, secret_ref.name
        );
        warn!(%reason, "cannot register target cluster");
        ctx.api
            .patch_status(&name, &TargetClusterStatus::not_ready(&reason, Utc::now()))
            .await?;
        return Ok(Action::requeue(Duration::from_secs(CREDENTIALS_REQUEUE_SECS)));
    };

    let kubeconfig = match kubeconfig_from_secret(&name, &secret) {
        Ok(bytes) => bytes,
        Err(e) => return reject_credentials(&target, &ctx, e).await,
    };

    // Re-registration replaces any existing entry, which is how rotated
    // credentials take effect
    if let Err(e) = ctx
        .registry
        .register(
            &name,
            &secret_ref.namespace,
            &kubeconfig,
            target.spec.labels.clone(),
            target.spec.capabilities.clone(),
        )
        .await
    {
        return reject_credentials(&target, &ctx, e).await;
    }
    ctx.events
        .publish(
            &target.object_ref(&()),
            EventType::Normal,
            reasons::TARGET_REGISTERED,
            actions::REGISTER,
            None,
        )
        .await;

    // One immediate probe so the status reflects reality, not just
    // registration; a failure keeps the entry with state Error
    let status = match ctx.monitor.refresh(&name).await {
        Ok(()) => {
            let conn = ctx
                .registry
                .get(&name)
                .ok_or_else(|| Error::not_registered(&name))?;
            info!(
                version = conn.server_version.as_deref().unwrap_or("unknown"),
                nodes = conn.node_count.unwrap_or(0),
                "target cluster ready"
            );
            TargetClusterStatus::ready(
                conn.server_version.unwrap_or_default(),
                conn.node_count.unwrap_or(0),
                Utc::now(),
            )
        }
        Err(e) => {
            warn!(error = %e, "target cluster registered but unreachable");
            ctx.events
                .publish(
                    &target.object_ref(&()),
                    EventType::Warning,
                    reasons::TARGET_UNREACHABLE,
                    actions::PROBE,
                    Some(e.to_string()),
                )
                .await;
            TargetClusterStatus::not_ready(e.to_string(), Utc::now())
        }
    };

    ctx.api.patch_status(&name, &status).await?;
    Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)))
}

/// Surface rejected credential material: NotReady status, Event, no entry
async fn reject_credentials(
    target: &TargetCluster,
    ctx: &TargetContext,
    error: Error,
) -> Result<Action> {
    let name = target.name_any();
    warn!(error = %error, "credential material rejected");
    ctx.events
        .publish(
            &target.object_ref(&()),
            EventType::Warning,
            reasons::CREDENTIALS_INVALID,
            actions::REGISTER,
            Some(error.to_string()),
        )
        .await;
    ctx.api
        .patch_status(
            &name,
            &TargetClusterStatus::not_ready(error.to_string(), Utc::now()),
        )
        .await?;
    Ok(Action::requeue(Duration::from_secs(CREDENTIALS_REQUEUE_SECS)))
}

/// Decide what to do when reconciliation fails
pub fn error_policy(target: Arc<TargetCluster>, error: &Error, _ctx: Arc<TargetContext>) -> Action {
    error!(
        ?error,
        cluster = %target.name_any(),
        "target cluster reconciliation failed"
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::sample_kubeconfig;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use stratus_common::crd::{SecretRef, TargetClusterSpec};
    use stratus_common::events::NoopEventPublisher;
    use stratus_common::KUBECONFIG_SECRET_KEY;

    fn sample_target(name: &str) -> TargetCluster {
        TargetCluster::new(
            name,
            TargetClusterSpec {
                secret_ref: SecretRef {
                    name: format!("{name}-kubeconfig"),
                    namespace: "stratus-system".to_string(),
                },
                labels: BTreeMap::from([("region".to_string(), "eu".to_string())]),
                capabilities: Default::default(),
            },
        )
    }

    fn kubeconfig_secret(bytes: Vec<u8>) -> Secret {
        Secret {
            data: Some(BTreeMap::from([(
                KUBECONFIG_SECRET_KEY.to_string(),
                ByteString(bytes),
            )])),
            ..Default::default()
        }
    }

    /// Captures every status the reconciler persists
    #[derive(Default)]
    struct RecordingTargetApi {
        secret: Option<Secret>,
        statuses: Mutex<Vec<TargetClusterStatus>>,
    }

    impl RecordingTargetApi {
        fn with_secret(secret: Secret) -> Self {
            Self {
                secret: Some(secret),
                statuses: Mutex::default(),
            }
        }

        fn last(&self) -> TargetClusterStatus {
            self.statuses
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("a status was persisted")
        }
    }

    #[async_trait]
    impl TargetApi for RecordingTargetApi {
        async fn get_secret(&self, _name: &str, _namespace: &str) -> Result<Option<Secret>> {
            Ok(self.secret.clone())
        }

        async fn patch_status(&self, _name: &str, status: &TargetClusterStatus) -> Result<()> {
            self.statuses.lock().unwrap().push(status.clone());
            Ok(())
        }
    }

    fn test_context(
        api: Arc<RecordingTargetApi>,
        registry: Arc<ClusterRegistry>,
    ) -> Arc<TargetContext> {
        let monitor = Arc::new(
            HealthMonitor::new(registry.clone()).with_probe_timeout(Duration::from_millis(250)),
        );
        Arc::new(TargetContext::for_testing(
            api,
            registry,
            monitor,
            Arc::new(NoopEventPublisher),
        ))
    }

    #[tokio::test]
    async fn missing_secret_reports_not_ready_and_registers_nothing() {
        let api = Arc::new(RecordingTargetApi::default());
        let registry = Arc::new(ClusterRegistry::new());
        let ctx = test_context(api.clone(), registry.clone());

        let action = reconcile(Arc::new(sample_target("edge-1")), ctx)
            .await
            .unwrap();

        let status = api.last();
        assert!(!status.ready);
        assert!(status.reason.contains("edge-1-kubeconfig"));
        assert!(status.reason.contains("not found"));
        assert!(registry.is_empty());
        assert_eq!(
            action,
            Action::requeue(Duration::from_secs(CREDENTIALS_REQUEUE_SECS))
        );
    }

    #[tokio::test]
    async fn secret_without_kubeconfig_key_is_rejected() {
        let bad_secret = Secret {
            data: Some(BTreeMap::from([(
                "value".to_string(),
                ByteString(b"whatever".to_vec()),
            )])),
            ..Default::default()
        };
        let api = Arc::new(RecordingTargetApi::with_secret(bad_secret));
        let registry = Arc::new(ClusterRegistry::new());
        let ctx = test_context(api.clone(), registry.clone());

        reconcile(Arc::new(sample_target("edge-1")), ctx)
            .await
            .unwrap();

        let status = api.last();
        assert!(!status.ready);
        assert!(status.reason.contains("kubeconfig"));
        assert!(registry.is_empty(), "rejected credentials install no entry");
    }

    #[tokio::test]
    async fn malformed_kubeconfig_is_rejected() {
        let api = Arc::new(RecordingTargetApi::with_secret(kubeconfig_secret(
            b"{{{ nope".to_vec(),
        )));
        let registry = Arc::new(ClusterRegistry::new());
        let ctx = test_context(api.clone(), registry.clone());

        reconcile(Arc::new(sample_target("edge-1")), ctx)
            .await
            .unwrap();

        assert!(!api.last().ready);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn valid_secret_registers_cluster_with_labels() {
        let api = Arc::new(RecordingTargetApi::with_secret(kubeconfig_secret(
            sample_kubeconfig("edge-1", 1),
        )));
        let registry = Arc::new(ClusterRegistry::new());
        let ctx = test_context(api.clone(), registry.clone());

        reconcile(Arc::new(sample_target("edge-1")), ctx)
            .await
            .unwrap();

        // Registered even though the endpoint is unreachable
        let conn = registry.get("edge-1").expect("cluster registered");
        assert_eq!(conn.labels.get("region").map(String::as_str), Some("eu"));

        // The immediate probe fails (nothing listens), so the status is
        // NotReady with the connectivity reason, entry retained
        let status = api.last();
        assert!(!status.ready);
        assert!(status.reason.contains("edge-1"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn deletion_deregisters_the_cluster() {
        let api = Arc::new(RecordingTargetApi::default());
        let registry = Arc::new(ClusterRegistry::new());
        crate::registry::test_support::register_sample(&registry, "edge-1").await;
        let ctx = test_context(api.clone(), registry.clone());

        let mut target = sample_target("edge-1");
        target.metadata.deletion_timestamp =
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(Utc::now()));

        let action = reconcile(Arc::new(target), ctx).await.unwrap();

        assert!(registry.is_empty());
        assert_eq!(action, Action::await_change());
        // No status write on deletion
        assert!(api.statuses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn error_policy_requeues_with_backoff() {
        let api = Arc::new(RecordingTargetApi::default());
        let registry = Arc::new(ClusterRegistry::new());
        let ctx = test_context(api, registry);

        let action = error_policy(
            Arc::new(sample_target("edge-1")),
            &Error::connectivity("edge-1", "refused"),
            ctx,
        );
        assert_eq!(action, Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS)));
    }
}
