//! Integration controller implementation
//!
//! Drives one Integration declaration toward observed reality across all
//! its target clusters: resolve each target against the cluster registry,
//! fan out type-specific health probes concurrently, join, aggregate the
//! outcomes into one phase, and overwrite the status resource.
//!
//! The state machine has no terminal state. Pending → Running | Failed,
//! Running → Failed on probe regression, Failed → Running on recovery;
//! every declaration change, periodic requeue, or watch event re-enters
//! the machine from scratch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use kube::api::{Api, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use stratus_common::crd::{
    Integration, IntegrationPhase, IntegrationStatus, IntegrationType, TargetStatus,
};
use stratus_common::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use stratus_common::metrics::{self, Outcome, ReconcileTimer, SyncTimer};
use stratus_common::{Error, Result, FIELD_MANAGER};

use crate::probe::{ProbeRunner, TypeProbeRunner};
use crate::registry::ClusterRegistry;
use crate::{DEFAULT_PASS_DEADLINE_SECS, DEFAULT_PROBE_TIMEOUT_SECS, PROBE_CONCURRENCY};

/// Reason reported while an Integration is disabled
pub const REASON_DISABLED: &str = "disabled";
/// Reason reported when an enabled Integration declares no targets
pub const REASON_NO_TARGETS: &str = "no target clusters declared";
/// Reason reported when the declared type is not in the closed enum
pub const REASON_UNSUPPORTED_TYPE: &str = "unsupported integration type";
/// Per-target reason when the identity has no registry entry
pub const REASON_NOT_REGISTERED: &str = "target cluster not registered";
/// Overall reason when every target reports ready
pub const REASON_ALL_READY: &str = "all target clusters ready";

/// Interval between scheduled passes when nothing is wrong
const REQUEUE_SECS: u64 = 60;
/// Backoff before retrying a pass that failed with a retryable error
const ERROR_REQUEUE_SECS: u64 = 5;

/// Trait abstracting the status write-back for Integration
///
/// Allows mocking the Kubernetes client in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusClient: Send + Sync {
    /// Overwrite the status of the named Integration
    async fn patch_status(&self, name: &str, status: &IntegrationStatus) -> Result<()>;
}

/// Real Kubernetes-backed status client
pub struct StatusClientImpl {
    client: Client,
}

impl StatusClientImpl {
    /// Create a status client wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StatusClient for StatusClientImpl {
    async fn patch_status(&self, name: &str, status: &IntegrationStatus) -> Result<()> {
        let api: Api<Integration> = Api::all(self.client.clone());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }
}

/// Shared context for the Integration controller
pub struct Context {
    /// Status write-back seam
    pub status: Arc<dyn StatusClient>,
    /// Cluster connection registry (shared with the target controller)
    pub registry: Arc<ClusterRegistry>,
    /// Type probe dispatch seam
    pub probes: Arc<dyn ProbeRunner>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Per-target probe timeout within the fan-out
    pub probe_timeout: Duration,
    /// Overall deadline for one pass; exceeded passes persist nothing
    pub pass_deadline: Duration,
}

impl Context {
    /// Production context backed by the given client and registry
    pub fn new(client: Client, registry: Arc<ClusterRegistry>) -> Self {
        Self {
            status: Arc::new(StatusClientImpl::new(client.clone())),
            probes: Arc::new(TypeProbeRunner::new()),
            events: Arc::new(KubeEventPublisher::new(
                client,
                "stratus-integration-controller",
            )),
            registry,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            pass_deadline: Duration::from_secs(DEFAULT_PASS_DEADLINE_SECS),
        }
    }

    /// Context with every seam supplied by the caller (primarily for tests)
    pub fn for_testing(
        status: Arc<dyn StatusClient>,
        registry: Arc<ClusterRegistry>,
        probes: Arc<dyn ProbeRunner>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            status,
            registry,
            probes,
            events,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            pass_deadline: Duration::from_secs(DEFAULT_PASS_DEADLINE_SECS),
        }
    }
}

/// Reconcile one Integration
///
/// The whole pass runs under `pass_deadline`. A pass that exceeds it is
/// abandoned with its partial results discarded, and the next scheduled
/// trigger retries from scratch.
#[instrument(skip(integration, ctx), fields(integration = %integration.name_any()))]
pub async fn reconcile(integration: Arc<Integration>, ctx: Arc<Context>) -> Result<Action> {
    let name = integration.name_any();
    let timer = ReconcileTimer::start(&name, &integration.spec.integration_type);

    match timeout(ctx.pass_deadline, reconcile_inner(&integration, &ctx)).await {
        Ok(Ok(action)) => {
            timer.finish(Outcome::Success);
            Ok(action)
        }
        Ok(Err(e)) => {
            timer.finish(Outcome::Error);
            Err(e)
        }
        Err(_) => {
            timer.finish(Outcome::Error);
            Err(Error::internal(
                "reconciler",
                format!(
                    "pass for {name} exceeded the {:?} deadline; partial results discarded",
                    ctx.pass_deadline
                ),
            ))
        }
    }
}

async fn reconcile_inner(integration: &Integration, ctx: &Context) -> Result<Action> {
    info!("reconciling integration");

    if !integration.spec.enabled {
        debug!("integration disabled, skipping probes");
        persist_status(
            integration,
            ctx,
            IntegrationPhase::Pending,
            REASON_DISABLED,
            Vec::new(),
        )
        .await?;
        return Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)));
    }

    // Unknown types fail dispatch deterministically: no silent default probe
    let integration_type = match integration.spec.parsed_type() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "declaration names an unknown type");
            persist_status(
                integration,
                ctx,
                IntegrationPhase::Failed,
                REASON_UNSUPPORTED_TYPE,
                Vec::new(),
            )
            .await?;
            // Requires a declaration edit; requeueing would retry blindly
            return Ok(Action::await_change());
        }
    };

    if integration.spec.targets.is_empty() {
        warn!("enabled integration declares no target clusters");
        persist_status(
            integration,
            ctx,
            IntegrationPhase::Failed,
            REASON_NO_TARGETS,
            Vec::new(),
        )
        .await?;
        return Ok(Action::await_change());
    }

    let name = integration.name_any();
    let targets = probe_targets(&name, integration_type, &integration.spec.targets, ctx).await;

    for target in &targets {
        metrics::set_integration_status(
            &name,
            integration_type.as_str(),
            &target.cluster,
            target.ready,
        );
    }

    let (phase, reason) = aggregate(&targets);
    persist_status(integration, ctx, phase, reason, targets).await?;

    Ok(Action::requeue(Duration::from_secs(REQUEUE_SECS)))
}

/// Fan out one probe per declared target, bounded and time-limited
///
/// Collection is the pass's join point: all probes (or their timeouts)
/// complete before aggregation, and results are restored to declaration
/// order so repeated passes produce identical status output.
async fn probe_targets(
    integration: &str,
    integration_type: IntegrationType,
    declared: &[String],
    ctx: &Context,
) -> Vec<TargetStatus> {
    let mut indexed: Vec<(usize, TargetStatus)> =
        futures::stream::iter(declared.iter().cloned().enumerate())
            .map(|(idx, cluster)| async move {
                (idx, probe_one(integration, integration_type, &cluster, ctx).await)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect()
            .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, target)| target).collect()
}

/// Probe a single target cluster; failures stay attributed to it alone
async fn probe_one(
    integration: &str,
    integration_type: IntegrationType,
    cluster: &str,
    ctx: &Context,
) -> TargetStatus {
    // Looked up by key each pass, never cached across passes
    let Some(connection) = ctx.registry.get(cluster) else {
        debug!(%cluster, "target has no registry entry, skipping probe");
        return TargetStatus {
            cluster: cluster.to_string(),
            ready: false,
            reason: REASON_NOT_REGISTERED.to_string(),
            last_probe: Some(Utc::now()),
        };
    };

    let timer = SyncTimer::start(integration, cluster);
    let (ready, reason) = match timeout(
        ctx.probe_timeout,
        ctx.probes.probe(integration_type, &connection),
    )
    .await
    {
        Ok(Ok(outcome)) => (outcome.ready, outcome.reason),
        Ok(Err(e)) => {
            debug!(%cluster, error = %e, "probe errored");
            (false, e.to_string())
        }
        // A timeout is a probe failure for this one cluster only
        Err(_) => (
            false,
            format!("probe timed out after {:?}", ctx.probe_timeout),
        ),
    };
    timer.finish(if ready { Outcome::Success } else { Outcome::Error });

    TargetStatus {
        cluster: cluster.to_string(),
        ready,
        reason,
        last_probe: Some(Utc::now()),
    }
}

/// Derive the overall phase and reason from the joined fan-out results
///
/// Running iff every target is ready; otherwise Failed, with the first
/// not-ready target (in declaration order) naming the overall reason.
fn aggregate(targets: &[TargetStatus]) -> (IntegrationPhase, String) {
    match targets.iter().find(|t| !t.ready) {
        None => (IntegrationPhase::Running, REASON_ALL_READY.to_string()),
        Some(first) => (
            IntegrationPhase::Failed,
            format!("target {}: {}", first.cluster, first.reason),
        ),
    }
}

/// Overwrite the status resource and emit an Event on phase transitions
async fn persist_status(
    integration: &Integration,
    ctx: &Context,
    phase: IntegrationPhase,
    reason: impl Into<String>,
    targets: Vec<TargetStatus>,
) -> Result<()> {
    let name = integration.name_any();
    let reason = reason.into();
    let previous = integration
        .status
        .as_ref()
        .map(|s| s.phase)
        .unwrap_or_default();

    let status = IntegrationStatus::with_phase(phase)
        .reason(&reason)
        .targets(targets)
        .observed_generation(integration.metadata.generation);
    ctx.status.patch_status(&name, &status).await?;

    if phase != previous {
        let (event_type, event_reason) = match phase {
            IntegrationPhase::Running => (EventType::Normal, reasons::INTEGRATION_RUNNING),
            IntegrationPhase::Failed => (EventType::Warning, reasons::INTEGRATION_FAILED),
            IntegrationPhase::Pending => (EventType::Normal, reasons::INTEGRATION_PENDING),
        };
        ctx.events
            .publish(
                &integration.object_ref(&()),
                event_type,
                event_reason,
                actions::RECONCILE,
                Some(reason.clone()),
            )
            .await;
    }

    if phase == IntegrationPhase::Failed {
        warn!(%reason, "integration status Failed");
    } else {
        info!(?phase, "integration status updated");
    }
    Ok(())
}

/// Decide what to do when reconciliation fails
///
/// Retryable errors (connectivity, our own API hiccups) requeue with a
/// short backoff; configuration errors wait for a declaration edit.
pub fn error_policy(integration: Arc<Integration>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        integration = %integration.name_any(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
    } else {
        Action::await_change()
    }
}
