//! Error types for the Stratus operator
//!
//! Errors are structured with fields so every failure carries its
//! cluster/integration attribution into logs and status reasons.

use thiserror::Error;

/// Main error type for Stratus operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error against our own control plane
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Malformed Integration declaration (unsupported type, empty target list)
    ///
    /// Terminal for the pass: surfaced as phase=Failed with a specific
    /// reason and not retried until the declaration is edited.
    #[error("configuration error for {integration}: {message}")]
    Configuration {
        /// Name of the Integration with the invalid declaration
        integration: String,
        /// Description of what's invalid
        message: String,
    },

    /// Target cluster unreachable (timeout, refused connection, DNS failure)
    ///
    /// Recoverable: the cluster is marked Error in the registry but not
    /// removed, and the next scheduled pass retries.
    #[error("connectivity error for {cluster}: {message}")]
    Connectivity {
        /// Name of the unreachable cluster
        cluster: String,
        /// Description of what failed
        message: String,
    },

    /// Target cluster identity has no registry entry
    ///
    /// Recoverable once the cluster is registered.
    #[error("target cluster {cluster} is not registered")]
    NotRegistered {
        /// Name of the missing cluster
        cluster: String,
    },

    /// Credential material for a cluster could not be parsed or used
    ///
    /// Registration is rejected and no registry entry is installed.
    #[error("credential error for {cluster}: {message}")]
    Credentials {
        /// Name of the cluster whose credentials are invalid
        cluster: String,
        /// Description of what's wrong with the material
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/process error (cannot reach our own control plane, etc.)
    ///
    /// Fatal at startup: the process must exit non-zero so a supervisor
    /// restarts it rather than running degraded and unobservable.
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Context where the error occurred (e.g. "reconciler", "startup")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error for the named Integration
    pub fn configuration(integration: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            integration: integration.into(),
            message: msg.into(),
        }
    }

    /// Create a connectivity error for the named cluster
    pub fn connectivity(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Connectivity {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a not-registered error for the named cluster
    pub fn not_registered(cluster: impl Into<String>) -> Self {
        Self::NotRegistered {
            cluster: cluster.into(),
        }
    }

    /// Create a credential error for the named cluster
    pub fn credentials(cluster: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Credentials {
            cluster: cluster.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Whether a retry without a declaration change can succeed
    ///
    /// Configuration errors require the user to edit the Integration, so
    /// requeueing them blindly just burns reconcile cycles.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Configuration { .. })
    }
}
