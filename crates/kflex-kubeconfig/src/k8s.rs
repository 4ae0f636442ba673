//! Kubernetes-backed bundle store.
//!
//! Bundles are Secrets in the control plane's namespace; creation events come
//! from a `kube::runtime` watcher on that namespace's Secrets.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ListParams};
use kube::runtime::watcher::{self, watcher, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::Client;
use tracing::{debug, info, warn};

use crate::bundle::{BundleStore, CreationEvent, CreationStream};
use crate::{KubeconfigError, Result};

/// Bundle store reading Secrets through the Kubernetes API.
#[derive(Clone)]
pub struct SecretBundleStore {
    client: Client,
}

impl SecretBundleStore {
    /// Create a store using the default client (in-cluster config or the
    /// local kubeconfig).
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes client cannot be created.
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create a store with a pre-configured client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Extract a secret's payloads as raw bytes.
fn secret_payloads(secret: Secret) -> BTreeMap<String, Vec<u8>> {
    secret
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| (key, value.0))
        .collect()
}

/// Map a watcher event to the bundle it reports, if any.
fn creation_event(event: watcher::Event<Secret>) -> Option<CreationEvent> {
    match event {
        watcher::Event::Apply(secret) | watcher::Event::InitApply(secret) => {
            secret.metadata.name.map(CreationEvent::new)
        }
        watcher::Event::Init | watcher::Event::InitDone | watcher::Event::Delete(_) => None,
    }
}

#[async_trait]
impl BundleStore for SecretBundleStore {
    async fn fetch(
        &self,
        namespace: &str,
        bundle_name: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>> {
        match self.secrets_api(namespace).get_opt(bundle_name).await? {
            Some(secret) => {
                debug!(namespace, bundle_name, "Fetched bundle secret");
                Ok(secret_payloads(secret))
            }
            None => Err(KubeconfigError::NotFound(format!(
                "secret {namespace}/{bundle_name}"
            ))),
        }
    }

    async fn subscribe(&self, namespace: &str) -> Result<CreationStream> {
        let secrets = self.secrets_api(namespace);

        // The watcher only reports failures as stream items and retries
        // forever, so reachability is checked up front.
        secrets
            .list(&ListParams::default().limit(1))
            .await
            .map_err(|e| KubeconfigError::Subscription(format!("namespace {namespace}: {e}")))?;

        info!(namespace, "Watching secrets for bundle creation");

        let ns = namespace.to_string();
        let stream = watcher(secrets, WatcherConfig::default())
            .default_backoff()
            .filter_map(move |event| {
                let item = match event {
                    Ok(event) => creation_event(event),
                    Err(e) => {
                        warn!(namespace = %ns, error = %e, "Secret watcher error, will retry");
                        None
                    }
                };
                futures::future::ready(item)
            });

        Ok(stream.boxed())
    }
}
