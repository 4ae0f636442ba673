//! Core types and utilities for kflex.
//!
//! This crate provides the foundational types shared by the kubeconfig
//! tooling:
//!
//! - **Identifiers**: validated control-plane names, types, and identities
//! - **Naming**: the deterministic namespace, cluster, user, and context names
//!   derived from a control-plane name, plus the per-type bundle locations
//! - **Error types**: common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use kflex_core::{ControlPlaneIdentity, DefaultNaming, NameGenerator, NamespaceResolver};
//!
//! let identity = ControlPlaneIdentity::parse("cp1", "vcluster").unwrap();
//! let naming = DefaultNaming;
//!
//! assert_eq!(naming.namespace(identity.name()), "cp1-system");
//! assert_eq!(naming.cluster_name(identity.name()), "cp1-cluster");
//! assert_eq!(naming.context_name(identity.name()), "cp1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod naming;

pub use error::{CoreError, Result};
pub use ids::{ControlPlaneIdentity, ControlPlaneName, ControlPlaneType};
pub use naming::{
    bundle_name_for_type, payload_key_for_type, DefaultNaming, NameGenerator, NamespaceResolver,
};
