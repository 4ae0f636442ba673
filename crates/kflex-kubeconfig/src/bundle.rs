//! Credential bundles and the stores that hold them.
//!
//! A bundle is a keyed set of byte payloads (a Kubernetes Secret, in
//! practice) in the control plane's namespace. One of its keys carries the
//! control plane's kubeconfig.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use kflex_core::{
    bundle_name_for_type, payload_key_for_type, ControlPlaneIdentity, NamespaceResolver,
};

use crate::Result;

/// Where a control plane's kubeconfig bundle lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSource {
    /// Namespace holding the bundle.
    pub namespace: String,
    /// Name of the bundle.
    pub bundle_name: String,
    /// Key whose payload is the kubeconfig.
    pub payload_key: String,
}

impl BundleSource {
    /// Resolve the bundle location for a control plane.
    #[must_use]
    pub fn for_control_plane(
        identity: &ControlPlaneIdentity,
        resolver: &impl NamespaceResolver,
    ) -> Self {
        Self {
            namespace: resolver.namespace(identity.name()),
            bundle_name: bundle_name_for_type(identity.cp_type()).to_string(),
            payload_key: payload_key_for_type(identity.cp_type()).to_string(),
        }
    }
}

impl fmt::Display for BundleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.bundle_name)
    }
}

/// A bundle was observed in a watched namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationEvent {
    /// Name of the bundle.
    pub name: String,
}

impl CreationEvent {
    /// Create an event for the named bundle.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Stream of bundle creation events. Dropping it ends the subscription.
pub type CreationStream = BoxStream<'static, CreationEvent>;

/// Keyed storage of credential bundles.
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Fetch all payloads of a bundle.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::NotFound` if the bundle does not exist, or a
    /// store error if the lookup fails.
    async fn fetch(
        &self,
        namespace: &str,
        bundle_name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Subscribe to bundle creation events in a namespace.
    ///
    /// Bundles that already exist when the subscription starts are reported
    /// first.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::Subscription` if the subscription cannot be
    /// established.
    async fn subscribe(&self, namespace: &str) -> Result<CreationStream>;
}
