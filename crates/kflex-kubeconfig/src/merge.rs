//! Merging a control plane's kubeconfig into the aggregate kubeconfig.

use std::collections::BTreeMap;

use crate::document::CredentialDocument;

/// Merge `source` into `dest`.
///
/// Every cluster, user, and context in `source` is inserted into `dest`,
/// replacing an entry of the same name. Entries only present in `dest` are
/// kept. `dest.current_context` always becomes `source.current_context`, so
/// the merged control plane is selected afterwards.
///
/// References between entries are not checked; see
/// [`CredentialDocument::dangling_references`].
pub fn merge(dest: &mut CredentialDocument, source: CredentialDocument) {
    union(&mut dest.clusters, source.clusters);
    union(&mut dest.auth_infos, source.auth_infos);
    union(&mut dest.contexts, source.contexts);
    dest.current_context = source.current_context;
}

fn union<V>(dest: &mut BTreeMap<String, V>, source: BTreeMap<String, V>) {
    dest.extend(source);
}
