//! Shared enums and status fragments used by the Stratus CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The closed set of third-party tools Stratus knows how to probe
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationType {
    /// Argo CD GitOps controller
    ArgoCd,
    /// Flux GitOps toolkit
    Flux,
    /// Prometheus monitoring stack (operator-managed)
    Prometheus,
    /// Istio service mesh control plane
    Istio,
}

impl IntegrationType {
    /// Label value for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArgoCd => "argocd",
            Self::Flux => "flux",
            Self::Prometheus => "prometheus",
            Self::Istio => "istio",
        }
    }
}

impl std::fmt::Display for IntegrationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown integration type string
///
/// The `type` field on an Integration spec is a free-form string so a typo
/// surfaces as a Failed status instead of a resource the API server rejects
/// wholesale; this is the parse failure the reconciler maps to the
/// "unsupported integration type" reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsupportedType(pub String);

impl std::fmt::Display for UnsupportedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unsupported integration type: {}", self.0)
    }
}

impl std::error::Error for UnsupportedType {}

impl std::str::FromStr for IntegrationType {
    type Err = UnsupportedType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "argocd" => Ok(Self::ArgoCd),
            "flux" => Ok(Self::Flux),
            "prometheus" => Ok(Self::Prometheus),
            "istio" => Ok(Self::Istio),
            _ => Err(UnsupportedType(s.to_string())),
        }
    }
}

/// Coarse-grained lifecycle state of an Integration
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IntegrationPhase {
    /// Before the first successful probe round, or while disabled
    #[default]
    Pending,
    /// Every declared target cluster reports ready
    Running,
    /// At least one target is unreachable, unregistered, or failed its probe
    Failed,
}

impl IntegrationPhase {
    /// Label value for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Failed => "Failed",
        }
    }
}

/// Per-target-cluster readiness within an Integration status
///
/// A non-owning reference: resolved against the cluster registry by key on
/// each reconciliation pass, never cached beyond one pass.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    /// Identity of the target cluster
    pub cluster: String,

    /// Whether the integration is installed and healthy on this cluster
    #[serde(default)]
    pub ready: bool,

    /// Human-readable reason, naming the first failing component when not ready
    #[serde(default)]
    pub reason: String,

    /// When this target was last probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<DateTime<Utc>>,
}
