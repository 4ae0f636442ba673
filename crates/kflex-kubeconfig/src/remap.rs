//! Renaming of generic kubeconfig entries.
//!
//! Freshly provisioned control planes hand out kubeconfigs whose entries use
//! fixed placeholder names (`my-vcluster`, `multicluster-controlplane`, ...).
//! Before such a document can be merged next to other control planes, those
//! placeholders are replaced with names derived from the control-plane name.

use std::collections::BTreeMap;

use kflex_core::{ControlPlaneIdentity, ControlPlaneType, NameGenerator};
use tracing::debug;

use crate::document::{Context, CredentialDocument};

/// Placeholder entry names used by a control-plane type's bundles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericKeys {
    /// Placeholder cluster name.
    pub cluster: &'static str,
    /// Placeholder user name.
    pub auth_info: &'static str,
    /// Placeholder context name.
    pub context: &'static str,
}

/// Look up the placeholder names for a control-plane type.
///
/// Returns `None` for types whose bundles are not remapped.
#[must_use]
pub const fn generic_keys(cp_type: ControlPlaneType) -> Option<GenericKeys> {
    match cp_type {
        ControlPlaneType::Ocm => Some(GenericKeys {
            cluster: "multicluster-controlplane",
            auth_info: "user",
            context: "multicluster-controlplane",
        }),
        ControlPlaneType::VCluster => Some(GenericKeys {
            cluster: "my-vcluster",
            auth_info: "my-vcluster",
            context: "my-vcluster",
        }),
        ControlPlaneType::K8s | ControlPlaneType::Host | ControlPlaneType::External => None,
    }
}

/// Move the entry at `old_key` to `new_key`, replacing any entry already
/// there. Returns whether an entry was moved.
pub fn rename_key<V>(map: &mut BTreeMap<String, V>, old_key: &str, new_key: &str) -> bool {
    match map.remove(old_key) {
        Some(value) => {
            map.insert(new_key.to_string(), value);
            true
        }
        None => false,
    }
}

/// Replace a document's placeholder entry names with the control plane's
/// unique names and make its context the current one.
///
/// For types with placeholder names, the context entry at the generated
/// context name is always (re)written to reference the generated cluster and
/// user names, whether or not a placeholder context existed. Applying this
/// twice yields the same document as applying it once. Documents for types
/// without placeholder names are left untouched.
pub fn remap(
    doc: &mut CredentialDocument,
    identity: &ControlPlaneIdentity,
    names: &impl NameGenerator,
) {
    let Some(keys) = generic_keys(identity.cp_type()) else {
        debug!(
            control_plane = %identity.name(),
            cp_type = %identity.cp_type(),
            "No generic keys for control plane type, leaving kubeconfig unchanged"
        );
        return;
    };

    let cp_name = identity.name();
    let cluster_name = names.cluster_name(cp_name);
    let auth_info_name = names.auth_info_admin_name(cp_name);
    let context_name = names.context_name(cp_name);

    let renamed_cluster = rename_key(&mut doc.clusters, keys.cluster, &cluster_name);
    let renamed_user = rename_key(&mut doc.auth_infos, keys.auth_info, &auth_info_name);
    let renamed_context = rename_key(&mut doc.contexts, keys.context, &context_name);

    // Rebuilt rather than renamed so it always points at the renamed entries.
    doc.contexts.insert(
        context_name.clone(),
        Context::new(cluster_name, auth_info_name),
    );
    doc.current_context = context_name;

    debug!(
        control_plane = %cp_name,
        renamed_cluster,
        renamed_user,
        renamed_context,
        "Remapped kubeconfig entries"
    );
}
