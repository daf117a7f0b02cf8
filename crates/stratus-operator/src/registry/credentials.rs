//! Credential handling for target clusters
//!
//! Turns the opaque kubeconfig material stored in a Secret into a live
//! `kube::Client`. Parsing happens eagerly at registration so malformed
//! credentials are rejected before any registry entry exists.

use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use stratus_common::{Error, Result, KUBECONFIG_SECRET_KEY};

/// Extract the kubeconfig bytes for `cluster` from a credential Secret
pub fn kubeconfig_from_secret(cluster: &str, secret: &Secret) -> Result<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
        .map(|bytes| bytes.0.clone())
        .ok_or_else(|| {
            Error::credentials(
                cluster,
                format!("secret is missing the '{KUBECONFIG_SECRET_KEY}' key"),
            )
        })
}

/// Build a `Client` for `cluster` from raw kubeconfig bytes
///
/// Every failure mode (not UTF-8, not YAML, no usable context, unbuildable
/// client) maps to [`Error::Credentials`] with the cluster attributed.
pub async fn client_from_kubeconfig(cluster: &str, kubeconfig: &[u8]) -> Result<Client> {
    let raw = std::str::from_utf8(kubeconfig)
        .map_err(|e| Error::credentials(cluster, format!("kubeconfig is not UTF-8: {e}")))?;

    let parsed = Kubeconfig::from_yaml(raw)
        .map_err(|e| Error::credentials(cluster, format!("kubeconfig parse failed: {e}")))?;

    let config = Config::from_custom_kubeconfig(parsed, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::credentials(cluster, format!("kubeconfig unusable: {e}")))?;

    Client::try_from(config)
        .map_err(|e| Error::credentials(cluster, format!("client construction failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::test_support::sample_kubeconfig;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn secret_with(key: &str, value: &[u8]) -> Secret {
        Secret {
            data: Some(BTreeMap::from([(
                key.to_string(),
                ByteString(value.to_vec()),
            )])),
            ..Default::default()
        }
    }

    #[test]
    fn extracts_kubeconfig_key() {
        let secret = secret_with(KUBECONFIG_SECRET_KEY, b"apiVersion: v1");
        let bytes = kubeconfig_from_secret("c1", &secret).unwrap();
        assert_eq!(bytes, b"apiVersion: v1");
    }

    #[test]
    fn missing_key_is_a_credential_error() {
        let secret = secret_with("value", b"whatever");
        let err = kubeconfig_from_secret("c1", &secret).unwrap_err();
        assert!(matches!(err, Error::Credentials { ref cluster, .. } if cluster == "c1"));
        assert!(err.to_string().contains("kubeconfig"));
    }

    #[test]
    fn empty_secret_is_a_credential_error() {
        let err = kubeconfig_from_secret("c1", &Secret::default()).unwrap_err();
        assert!(matches!(err, Error::Credentials { .. }));
    }

    #[tokio::test]
    async fn valid_kubeconfig_builds_a_client() {
        // No network access: client construction only parses the config
        let result = client_from_kubeconfig("c1", &sample_kubeconfig("c1", 6443)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn garbage_yaml_is_rejected() {
        let err = client_from_kubeconfig("c1", b"{{{ nope").await.err().unwrap();
        assert!(matches!(err, Error::Credentials { ref cluster, .. } if cluster == "c1"));
    }

    #[tokio::test]
    async fn kubeconfig_without_current_context_is_rejected() {
        let yaml = b"apiVersion: v1\nkind: Config\nclusters: []\ncontexts: []\nusers: []\n";
        let err = client_from_kubeconfig("c1", yaml).await.err().unwrap();
        assert!(matches!(err, Error::Credentials { .. }));
    }

    #[tokio::test]
    async fn non_utf8_material_is_rejected() {
        let err = client_from_kubeconfig("c1", &[0xff, 0xfe, 0x00])
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("not UTF-8"));
    }
}
