//! Control-plane credential extraction and kubeconfig merging for kflex.
//!
//! Every control plane provisioned by kflex publishes an admin kubeconfig in a
//! bundle (a Secret in the control plane's namespace). This crate:
//!
//! - Fetches and decodes that kubeconfig
//! - Renames its placeholder entries (`my-vcluster`, `multicluster-controlplane`, ...)
//!   to names unique to the control plane
//! - Merges it into the user's aggregate kubeconfig and selects its context
//! - Waits for a bundle that has not been published yet
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        KubeconfigLoader                         │
//! │                                                                 │
//! │   fetch ─▶ decode ─▶ remap ─▶ load aggregate ─▶ merge ─▶ persist │
//! └─────┬──────────────────────────────┬────────────────────────────┘
//!       │                              │
//!       ▼                              ▼
//! ┌─────────────┐               ┌─────────────┐
//! │ BundleStore │               │  Aggregate  │
//! │  (Secrets)  │               │ Store (file)│
//! └─────────────┘               └─────────────┘
//!       ▲
//!       │ subscribe
//! ┌─────────────┐
//! │  wait_for_  │
//! │   bundle    │
//! └─────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kflex_core::ControlPlaneIdentity;
//! use kflex_kubeconfig::{
//!     AggregateStore, KubeconfigConfig, KubeconfigLoader, SecretBundleStore, WaitOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KubeconfigConfig::from_env();
//! let store = SecretBundleStore::try_default().await?;
//! let loader = KubeconfigLoader::new(store, AggregateStore::from_config(&config));
//!
//! let identity = ControlPlaneIdentity::parse("cp1", "vcluster")?;
//! loader
//!     .wait_for_bundle(&identity, WaitOptions::with_timeout(config.wait_timeout))
//!     .await?;
//! let merged = loader.load_and_merge(&identity).await?;
//! println!("current context: {}", merged.current_context);
//! # Ok(())
//! # }
//! ```
//!
//! # Concurrency
//!
//! The aggregate kubeconfig is a single shared file. A loader serializes its
//! own `load_and_merge` calls, but two loaders (or two processes) merging
//! into the same file at once can lose one side's entries.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod bundle;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod k8s;
pub mod loader;
pub mod memory;
pub mod merge;
pub mod remap;
pub mod wait;

pub use aggregate::AggregateStore;
pub use bundle::{BundleSource, BundleStore, CreationEvent, CreationStream};
pub use config::KubeconfigConfig;
pub use document::{AuthInfo, Cluster, Context, CredentialDocument, DanglingReference};
pub use error::{KubeconfigError, Result};
pub use k8s::SecretBundleStore;
pub use loader::KubeconfigLoader;
pub use memory::InMemoryBundleStore;
pub use merge::merge;
pub use remap::{generic_keys, remap, GenericKeys};
pub use wait::{wait_for_bundle, WaitOptions};
pub use tokio_util::sync::CancellationToken;
