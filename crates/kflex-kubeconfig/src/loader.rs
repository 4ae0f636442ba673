//! Importing a control plane's kubeconfig into the aggregate kubeconfig.

use kflex_core::{ControlPlaneIdentity, DefaultNaming, NameGenerator, NamespaceResolver};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregate::AggregateStore;
use crate::bundle::{BundleSource, BundleStore};
use crate::codec;
use crate::document::CredentialDocument;
use crate::merge::merge;
use crate::remap::remap;
use crate::wait::{wait_for_bundle, WaitOptions};
use crate::{KubeconfigError, Result};

/// Fetches control-plane kubeconfigs from a bundle store and merges them
/// into the aggregate kubeconfig.
///
/// `load_and_merge` calls on the same loader are serialized. Nothing
/// coordinates with other loaders or processes writing the same aggregate
/// file; callers must not run those concurrently.
pub struct KubeconfigLoader<S, N = DefaultNaming> {
    store: S,
    naming: N,
    aggregate: AggregateStore,
    write_lock: Mutex<()>,
}

impl<S: BundleStore> KubeconfigLoader<S> {
    /// Create a loader using the default naming scheme.
    #[must_use]
    pub fn new(store: S, aggregate: AggregateStore) -> Self {
        Self::with_naming(store, DefaultNaming, aggregate)
    }
}

impl<S, N> KubeconfigLoader<S, N>
where
    S: BundleStore,
    N: NamespaceResolver + NameGenerator,
{
    /// Create a loader with a custom naming scheme.
    #[must_use]
    pub fn with_naming(store: S, naming: N, aggregate: AggregateStore) -> Self {
        Self {
            store,
            naming,
            aggregate,
            write_lock: Mutex::new(()),
        }
    }

    /// The bundle store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The aggregate kubeconfig store.
    #[must_use]
    pub const fn aggregate(&self) -> &AggregateStore {
        &self.aggregate
    }

    /// Where the control plane's kubeconfig bundle lives.
    #[must_use]
    pub fn bundle_source(&self, identity: &ControlPlaneIdentity) -> BundleSource {
        BundleSource::for_control_plane(identity, &self.naming)
    }

    /// Fetch and decode the control plane's kubeconfig, without remapping.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the bundle does not exist, `KeyMissing` if it has
    /// no kubeconfig payload, or `Decode` if the payload is malformed.
    pub async fn fetch_document(
        &self,
        identity: &ControlPlaneIdentity,
    ) -> Result<CredentialDocument> {
        let source = self.bundle_source(identity);
        let mut payloads = self
            .store
            .fetch(&source.namespace, &source.bundle_name)
            .await?;

        let payload = payloads
            .remove(&source.payload_key)
            .ok_or_else(|| KubeconfigError::KeyMissing {
                bundle: source.to_string(),
                key: source.payload_key.clone(),
            })?;

        debug!(
            control_plane = %identity.name(),
            bundle = %source,
            bytes = payload.len(),
            "Fetched control plane kubeconfig"
        );
        codec::decode(&payload)
    }

    /// Fetch the control plane's kubeconfig with its entries renamed for
    /// merging.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_document`].
    pub async fn remapped_document(
        &self,
        identity: &ControlPlaneIdentity,
    ) -> Result<CredentialDocument> {
        let mut doc = self.fetch_document(identity).await?;
        remap(&mut doc, identity, &self.naming);
        Ok(doc)
    }

    /// Merge the control plane's kubeconfig into the aggregate kubeconfig on
    /// disk and make it the current context.
    ///
    /// A missing aggregate file is treated as empty. Returns the document
    /// that was written.
    ///
    /// # Errors
    ///
    /// Any step's error aborts the call; the aggregate file is only written
    /// by the final step.
    pub async fn load_and_merge(
        &self,
        identity: &ControlPlaneIdentity,
    ) -> Result<CredentialDocument> {
        let _guard = self.write_lock.lock().await;

        let doc = self.remapped_document(identity).await?;
        let mut aggregate = self.aggregate.load_or_default()?;
        merge_and_report(identity, &mut aggregate, doc);
        self.aggregate.persist(&aggregate)?;

        info!(
            control_plane = %identity.name(),
            context = %aggregate.current_context,
            path = %self.aggregate.path().display(),
            "Merged control plane kubeconfig"
        );
        Ok(aggregate)
    }

    /// [`Self::load_and_merge`] for a control plane given by name and type
    /// strings, as they arrive from a command line or a custom resource.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::Core` if the name or type is invalid, before
    /// anything is fetched; otherwise see [`Self::load_and_merge`].
    pub async fn load_and_merge_by_name(
        &self,
        name: &str,
        cp_type: &str,
    ) -> Result<CredentialDocument> {
        let identity = ControlPlaneIdentity::parse(name, cp_type)?;
        self.load_and_merge(&identity).await
    }

    /// Merge the control plane's kubeconfig into `aggregate` without reading
    /// or writing the aggregate file.
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_document`]. `aggregate` is untouched on error.
    pub async fn load_and_merge_no_write(
        &self,
        identity: &ControlPlaneIdentity,
        aggregate: &mut CredentialDocument,
    ) -> Result<()> {
        let doc = self.remapped_document(identity).await?;
        merge_and_report(identity, aggregate, doc);
        Ok(())
    }

    /// Block until the control plane's kubeconfig bundle exists.
    ///
    /// # Errors
    ///
    /// See [`wait_for_bundle`].
    pub async fn wait_for_bundle(
        &self,
        identity: &ControlPlaneIdentity,
        options: WaitOptions,
    ) -> Result<()> {
        let source = self.bundle_source(identity);
        wait_for_bundle(&self.store, &source.namespace, &source.bundle_name, options).await
    }
}

/// Merge `doc` into `aggregate`, logging references left dangling.
fn merge_and_report(
    identity: &ControlPlaneIdentity,
    aggregate: &mut CredentialDocument,
    doc: CredentialDocument,
) {
    merge(aggregate, doc);

    for dangling in aggregate.dangling_references() {
        warn!(
            control_plane = %identity.name(),
            problem = %dangling,
            "Merged kubeconfig has a dangling reference"
        );
    }
}
