//! TargetCluster Custom Resource Definition
//!
//! A TargetCluster names one remote cluster and points at the Secret
//! holding its kubeconfig. The target reconciler resolves it into a live
//! registry entry and reports Ready/NotReady.
//!
//! Credential rotation is not watched: updating the referenced Secret
//! takes effect on the next TargetCluster reconciliation or operator
//! restart. This is a documented limitation of the credential contract.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::STRATUS_SYSTEM_NAMESPACE;

/// Reference to the Secret holding a cluster's kubeconfig
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    /// Name of the Secret
    pub name: String,

    /// Namespace of the Secret; defaults to the Stratus system namespace
    #[serde(default = "default_secret_namespace")]
    pub namespace: String,
}

fn default_secret_namespace() -> String {
    STRATUS_SYSTEM_NAMESPACE.to_string()
}

/// Specification for a TargetCluster
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "stratus.dev",
    version = "v1alpha1",
    kind = "TargetCluster",
    plural = "targetclusters",
    shortname = "tc",
    status = "TargetClusterStatus",
    namespaced = false,
    printcolumn = r#"{"name":"Ready","type":"boolean","jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.serverVersion"}"#,
    printcolumn = r#"{"name":"Nodes","type":"integer","jsonPath":".status.nodeCount"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TargetClusterSpec {
    /// Where to find this cluster's kubeconfig material
    pub secret_ref: SecretRef,

    /// Labels applied to the registry entry, queryable via listByLabel
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Capability tags for the registry entry (set semantics, no duplicates)
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub capabilities: BTreeSet<String>,
}

/// Status for a TargetCluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetClusterStatus {
    /// Whether the cluster is registered and its API is reachable
    #[serde(default)]
    pub ready: bool,

    /// Human-readable reason when not ready
    #[serde(default)]
    pub reason: String,

    /// Kubernetes server version discovered on the last successful probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,

    /// Node count discovered on the last successful probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_count: Option<u32>,

    /// When this cluster was last probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_probe: Option<DateTime<Utc>>,
}

impl TargetClusterStatus {
    /// Ready status with discovery results
    pub fn ready(version: impl Into<String>, node_count: u32, probed_at: DateTime<Utc>) -> Self {
        Self {
            ready: true,
            reason: "cluster registered and reachable".to_string(),
            server_version: Some(version.into()),
            node_count: Some(node_count),
            last_probe: Some(probed_at),
        }
    }

    /// NotReady status with the given reason
    pub fn not_ready(reason: impl Into<String>, probed_at: DateTime<Utc>) -> Self {
        Self {
            ready: false,
            reason: reason.into(),
            server_version: None,
            node_count: None,
            last_probe: Some(probed_at),
        }
    }
}
