//! Deterministic names derived from a control-plane name.
//!
//! Every control plane gets its own namespace in the hosting cluster and its
//! own cluster, user, and context entries in the user's kubeconfig. The
//! functions here are pure: the same control-plane name always produces the
//! same names, and distinct control-plane names never collide.

use crate::ids::ControlPlaneType;

/// Maps a control-plane name to the namespace hosting it.
pub trait NamespaceResolver: Send + Sync {
    /// Namespace that holds the control plane's resources.
    fn namespace(&self, control_plane: &str) -> String;
}

/// Generates collision-free kubeconfig entry names for a control plane.
pub trait NameGenerator: Send + Sync {
    /// Name of the cluster entry.
    fn cluster_name(&self, control_plane: &str) -> String;

    /// Name of the admin user (auth-info) entry.
    fn auth_info_admin_name(&self, control_plane: &str) -> String;

    /// Name of the context entry.
    fn context_name(&self, control_plane: &str) -> String;
}

/// The naming scheme used by kflex-provisioned control planes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultNaming;

impl NamespaceResolver for DefaultNaming {
    fn namespace(&self, control_plane: &str) -> String {
        format!("{control_plane}-system")
    }
}

impl NameGenerator for DefaultNaming {
    fn cluster_name(&self, control_plane: &str) -> String {
        format!("{control_plane}-cluster")
    }

    fn auth_info_admin_name(&self, control_plane: &str) -> String {
        format!("{control_plane}-admin")
    }

    fn context_name(&self, control_plane: &str) -> String {
        control_plane.to_string()
    }
}

/// Name of the secret holding a control plane's kubeconfig bundle.
#[must_use]
pub const fn bundle_name_for_type(cp_type: ControlPlaneType) -> &'static str {
    match cp_type {
        ControlPlaneType::Ocm => "multicluster-controlplane-kubeconfig",
        ControlPlaneType::VCluster => "vc-vcluster",
        ControlPlaneType::K8s | ControlPlaneType::Host | ControlPlaneType::External => {
            "admin-kubeconfig"
        }
    }
}

/// Key inside the bundle secret whose value is the kubeconfig document.
#[must_use]
pub const fn payload_key_for_type(cp_type: ControlPlaneType) -> &'static str {
    match cp_type {
        ControlPlaneType::VCluster => "config",
        ControlPlaneType::Ocm
        | ControlPlaneType::K8s
        | ControlPlaneType::Host
        | ControlPlaneType::External => "kubeconfig",
    }
}
