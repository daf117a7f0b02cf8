//! Kubernetes Event recording for Stratus controllers.
//!
//! Wraps `kube::runtime::events::Recorder` behind a trait so controllers
//! can emit standard Events (visible via `kubectl describe`) while tests
//! use the no-op implementation.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate. A failed event must never break reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Trait for publishing Kubernetes Events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an Event on the given resource.
    ///
    /// `reason` is a machine-readable PascalCase string (see [`reasons`]);
    /// `note` is the human-readable message.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// Create a publisher reporting as the given controller name.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish Kubernetes event");
        }
    }
}

/// No-op implementation for tests.
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Well-known event reason strings.
pub mod reasons {
    /// Integration transitioned to Running (all targets ready)
    pub const INTEGRATION_RUNNING: &str = "IntegrationRunning";
    /// Integration transitioned to Failed (at least one target not ready)
    pub const INTEGRATION_FAILED: &str = "IntegrationFailed";
    /// Integration is disabled or awaiting its first probe round
    pub const INTEGRATION_PENDING: &str = "IntegrationPending";
    /// Target cluster registered into the connection registry
    pub const TARGET_REGISTERED: &str = "TargetRegistered";
    /// Target cluster failed its reachability probe
    pub const TARGET_UNREACHABLE: &str = "TargetUnreachable";
    /// Target cluster credential material was rejected
    pub const CREDENTIALS_INVALID: &str = "CredentialsInvalid";
}

/// Well-known event action strings.
pub mod actions {
    /// Standard reconciliation loop
    pub const RECONCILE: &str = "Reconcile";
    /// Probing a target cluster
    pub const PROBE: &str = "Probe";
    /// Registering a target cluster
    pub const REGISTER: &str = "Register";
}
