//! Integration Custom Resource Definition
//!
//! An Integration declares that one third-party tool (ArgoCD, Flux,
//! Prometheus, Istio) should be installed and healthy across a set of
//! target clusters. The spec is read-only to the operator; the status is
//! owned entirely by the Integration reconciler and fully overwritten on
//! every pass.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{IntegrationPhase, IntegrationType, TargetStatus, UnsupportedType};

/// Specification for an Integration
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stratus.dev",
    version = "v1alpha1",
    kind = "Integration",
    plural = "integrations",
    shortname = "intg",
    status = "IntegrationStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Reason","type":"string","jsonPath":".status.reason"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    /// Which tool to verify: "argocd", "flux", "prometheus", or "istio"
    ///
    /// Kept as a free string and parsed at reconcile time so an unknown
    /// value produces phase=Failed with "unsupported integration type"
    /// rather than a resource the controller cannot deserialize at all.
    #[serde(rename = "type")]
    pub integration_type: String,

    /// Whether this Integration should be reconciled
    ///
    /// When false the status is Pending with reason "disabled" and no
    /// target cluster is probed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Identities of the target clusters; must be non-empty when enabled
    #[serde(default)]
    pub targets: Vec<String>,

    /// Opaque tool-specific configuration, passed through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl IntegrationSpec {
    /// Parse the declared type into the closed [`IntegrationType`] enum
    pub fn parsed_type(&self) -> Result<IntegrationType, UnsupportedType> {
        self.integration_type.parse()
    }
}

/// Status for an Integration
///
/// Rewritten wholesale by the reconciler on every pass; never partially
/// patched by another actor.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationStatus {
    /// The generation of the spec that was last processed by the controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Current phase of the Integration
    #[serde(default)]
    pub phase: IntegrationPhase,

    /// Derived overall reason for the current phase
    #[serde(default)]
    pub reason: String,

    /// Per-target-cluster readiness, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetStatus>,
}

impl IntegrationStatus {
    /// Create a new status with the given phase
    pub fn with_phase(phase: IntegrationPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the overall reason and return self for chaining
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Set the per-target statuses and return self for chaining
    pub fn targets(mut self, targets: Vec<TargetStatus>) -> Self {
        self.targets = targets;
        self
    }

    /// Set the observed generation and return self for chaining
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_json(ty: &str, enabled: bool, targets: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "type": ty,
            "enabled": enabled,
            "targets": targets,
        })
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        // enabled defaults to true, targets/config to empty
        let spec: IntegrationSpec =
            serde_json::from_value(serde_json::json!({"type": "flux"})).unwrap();
        assert!(spec.enabled);
        assert!(spec.targets.is_empty());
        assert!(spec.config.is_empty());
        assert_eq!(spec.parsed_type().unwrap(), IntegrationType::Flux);
    }

    #[test]
    fn unknown_type_survives_deserialization() {
        // The typo must reach the reconciler, which turns it into a
        // Failed status; it must not be rejected at the serde layer.
        let spec: IntegrationSpec =
            serde_json::from_value(spec_json("argcd", true, &["c1"])).unwrap();
        let err = spec.parsed_type().unwrap_err();
        assert_eq!(err.to_string(), "unsupported integration type: argcd");
    }

    #[test]
    fn status_builder_chains() {
        let status = IntegrationStatus::with_phase(IntegrationPhase::Failed)
            .reason("target c2: probe failed")
            .observed_generation(Some(3));
        assert_eq!(status.phase, IntegrationPhase::Failed);
        assert_eq!(status.reason, "target c2: probe failed");
        assert_eq!(status.observed_generation, Some(3));
    }

    #[test]
    fn status_serializes_camel_case() {
        let status = IntegrationStatus::with_phase(IntegrationPhase::Running)
            .observed_generation(Some(1));
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["observedGeneration"], 1);
        assert_eq!(value["phase"], "Running");
    }
}
