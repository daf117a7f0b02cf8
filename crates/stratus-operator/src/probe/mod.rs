//! Per-integration-type health probes
//!
//! Each [`IntegrationType`] declares the workloads that must exist and be
//! healthy on a target cluster, in a stable order. A probe reports
//! Ready=true only when every required component passes; otherwise the
//! reason names the first failing component so operators get an
//! actionable diagnostic instead of an arbitrary one.
//!
//! The type set is a closed enum on purpose: dispatch stays exhaustive
//! and compiler-checked rather than an open plugin registry.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::{Api, Client};

#[cfg(test)]
use mockall::automock;

use stratus_common::crd::IntegrationType;
use stratus_common::{Error, Result};

use crate::registry::ClusterConnection;

/// Workload kinds a component check can target
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// A Deployment that must have at least one available replica
    Deployment,
    /// A StatefulSet that must have at least one ready replica
    StatefulSet,
}

impl WorkloadKind {
    /// Lowercase kind name for reason strings
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::StatefulSet => "statefulset",
        }
    }
}

/// One required component of an integration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentCheck {
    /// Workload kind to inspect
    pub kind: WorkloadKind,
    /// Namespace the component is expected in
    pub namespace: &'static str,
    /// Workload name
    pub name: &'static str,
}

impl ComponentCheck {
    const fn deployment(namespace: &'static str, name: &'static str) -> Self {
        Self {
            kind: WorkloadKind::Deployment,
            namespace,
            name,
        }
    }

    const fn statefulset(namespace: &'static str, name: &'static str) -> Self {
        Self {
            kind: WorkloadKind::StatefulSet,
            namespace,
            name,
        }
    }
}

/// Required components per integration type, in check order
///
/// The order is part of the contract: the first failing entry names the
/// reason, so reordering changes user-visible diagnostics.
pub fn required_components(integration_type: IntegrationType) -> &'static [ComponentCheck] {
    match integration_type {
        IntegrationType::ArgoCd => {
            const CHECKS: &[ComponentCheck] = &[
                ComponentCheck::deployment("argocd", "argocd-server"),
                ComponentCheck::deployment("argocd", "argocd-repo-server"),
                ComponentCheck::deployment("argocd", "argocd-applicationset-controller"),
                ComponentCheck::statefulset("argocd", "argocd-application-controller"),
            ];
            CHECKS
        }
        IntegrationType::Flux => {
            const CHECKS: &[ComponentCheck] = &[
                ComponentCheck::deployment("flux-system", "source-controller"),
                ComponentCheck::deployment("flux-system", "kustomize-controller"),
                ComponentCheck::deployment("flux-system", "helm-controller"),
                ComponentCheck::deployment("flux-system", "notification-controller"),
            ];
            CHECKS
        }
        IntegrationType::Prometheus => {
            const CHECKS: &[ComponentCheck] = &[
                ComponentCheck::deployment("monitoring", "prometheus-operator"),
                ComponentCheck::statefulset("monitoring", "prometheus-k8s"),
                ComponentCheck::statefulset("monitoring", "alertmanager-main"),
            ];
            CHECKS
        }
        IntegrationType::Istio => {
            const CHECKS: &[ComponentCheck] = &[
                ComponentCheck::deployment("istio-system", "istiod"),
                ComponentCheck::deployment("istio-system", "istio-ingressgateway"),
            ];
            CHECKS
        }
    }
}

/// Result of probing one target cluster for one integration type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Whether every required component is present and healthy
    pub ready: bool,
    /// Human-readable reason; names the first failing component when not ready
    pub reason: String,
}

/// Reads workload health on a target cluster
///
/// Seam between the probe logic and the Kubernetes API so the per-type
/// checks are testable without a cluster.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadInspector: Send + Sync {
    /// Whether the named Deployment exists with ≥1 available replica
    async fn deployment_available(&self, namespace: &str, name: &str) -> Result<bool>;

    /// Whether the named StatefulSet exists with ≥1 ready replica
    async fn statefulset_ready(&self, namespace: &str, name: &str) -> Result<bool>;
}

/// Production inspector backed by a target cluster's API client
pub struct KubeWorkloadInspector {
    client: Client,
    cluster: String,
}

impl KubeWorkloadInspector {
    /// Create an inspector for the given cluster connection's client
    pub fn new(cluster: impl Into<String>, client: Client) -> Self {
        Self {
            client,
            cluster: cluster.into(),
        }
    }

    fn connectivity(&self, what: &str, e: kube::Error) -> Error {
        Error::connectivity(&self.cluster, format!("{what} failed: {e}"))
    }
}

#[async_trait]
impl WorkloadInspector for KubeWorkloadInspector {
    async fn deployment_available(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = api
            .get_opt(name)
            .await
            .map_err(|e| self.connectivity(&format!("get deployment {namespace}/{name}"), e))?;

        Ok(deployment
            .and_then(|d| d.status)
            .and_then(|s| s.available_replicas)
            .is_some_and(|replicas| replicas > 0))
    }

    async fn statefulset_ready(&self, namespace: &str, name: &str) -> Result<bool> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        let statefulset = api
            .get_opt(name)
            .await
            .map_err(|e| self.connectivity(&format!("get statefulset {namespace}/{name}"), e))?;

        Ok(statefulset
            .and_then(|s| s.status)
            .and_then(|s| s.ready_replicas)
            .is_some_and(|replicas| replicas > 0))
    }
}

/// Run the required-component checks for one integration type
///
/// Checks run in declared order and stop at the first unhealthy
/// component. API errors (cluster unreachable mid-probe) propagate so the
/// caller can distinguish "component missing" from "could not look".
pub async fn probe_components(
    inspector: &dyn WorkloadInspector,
    integration_type: IntegrationType,
) -> Result<ProbeOutcome> {
    for check in required_components(integration_type) {
        let healthy = match check.kind {
            WorkloadKind::Deployment => {
                inspector
                    .deployment_available(check.namespace, check.name)
                    .await?
            }
            WorkloadKind::StatefulSet => {
                inspector.statefulset_ready(check.namespace, check.name).await?
            }
        };
        if !healthy {
            return Ok(ProbeOutcome {
                ready: false,
                reason: format!(
                    "{} {}/{} is not ready",
                    check.kind.as_str(),
                    check.namespace,
                    check.name
                ),
            });
        }
    }

    Ok(ProbeOutcome {
        ready: true,
        reason: format!("all {} components ready", integration_type.as_str()),
    })
}

/// Seam the Integration reconciler fans out through
///
/// The production implementation dispatches on the integration type
/// against the target connection's client; tests substitute a mock to
/// script per-cluster outcomes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    /// Probe one target cluster for one integration type
    async fn probe(
        &self,
        integration_type: IntegrationType,
        connection: &ClusterConnection,
    ) -> Result<ProbeOutcome>;
}

/// Production probe runner
#[derive(Default)]
pub struct TypeProbeRunner;

impl TypeProbeRunner {
    /// Create the production runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeRunner for TypeProbeRunner {
    async fn probe(
        &self,
        integration_type: IntegrationType,
        connection: &ClusterConnection,
    ) -> Result<ProbeOutcome> {
        let inspector = KubeWorkloadInspector::new(&connection.name, connection.client());
        probe_components(&inspector, integration_type).await
    }
}
