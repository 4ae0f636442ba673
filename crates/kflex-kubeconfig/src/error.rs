//! Error types for the kubeconfig crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while extracting, merging, or waiting for
/// control-plane credentials.
#[derive(Error, Debug)]
pub enum KubeconfigError {
    /// The requested bundle or aggregate kubeconfig does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bundle exists but does not carry the expected payload key.
    #[error("bundle {bundle} has no key {key:?}")]
    KeyMissing {
        /// `namespace/name` of the bundle.
        bundle: String,
        /// The payload key that was expected.
        key: String,
    },

    /// The payload is not a well-formed kubeconfig document.
    #[error("failed to decode kubeconfig: {0}")]
    Decode(String),

    /// A subscription to bundle creation events could not be established.
    #[error("failed to subscribe to bundle events: {0}")]
    Subscription(String),

    /// The bundle event stream ended before the awaited bundle appeared.
    #[error("bundle event stream closed before the bundle appeared")]
    SubscriptionClosed,

    /// The aggregate kubeconfig exists but could not be read.
    #[error("failed to read kubeconfig: {0}")]
    Io(String),

    /// Writing the aggregate kubeconfig failed.
    #[error("failed to persist kubeconfig: {0}")]
    Persist(String),

    /// The wait was cancelled by the caller.
    #[error("wait cancelled")]
    Cancelled,

    /// The wait did not complete within the configured timeout.
    #[error("timed out after {0:?} waiting for bundle")]
    TimedOut(Duration),

    /// Kubernetes API error.
    #[error("Kubernetes API error: {0}")]
    KubeApi(#[from] kube::Error),

    /// Invalid control-plane identity.
    #[error(transparent)]
    Core(#[from] kflex_core::CoreError),
}

impl KubeconfigError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::KubeApi(_) | Self::Subscription(_) | Self::SubscriptionClosed | Self::TimedOut(_)
        )
    }

    /// Check if this error means the requested object is absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A specialized Result type for kubeconfig operations.
pub type Result<T> = std::result::Result<T, KubeconfigError>;
