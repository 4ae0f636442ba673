//! The kubeconfig document model.
//!
//! On the wire a kubeconfig carries its clusters, users, and contexts as
//! named lists. In memory they are keyed maps, which is what the remap and
//! merge steps operate on. Conversion between the two enforces that names
//! are unique within each list.
//!
//! Fields this crate does not interpret (`exec`, `proxy-url`, extensions,
//! ...) are kept verbatim so that a document read and written back by kflex
//! stays usable by `kubectl` and other kubeconfig tooling.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;

const API_VERSION: &str = "v1";
const KIND: &str = "Config";

/// Connection details for a Kubernetes API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    /// API server URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    /// Base64-encoded PEM CA bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    /// Path to a PEM CA bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority: Option<String>,
    /// Skip server certificate verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_tls_verify: Option<bool>,
    /// Server name used for SNI and certificate verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_server_name: Option<String>,
    /// Fields not interpreted by kflex.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Client credentials for a Kubernetes API server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AuthInfo {
    /// Base64-encoded PEM client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate_data: Option<String>,
    /// Base64-encoded PEM client key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key_data: Option<String>,
    /// Path to a PEM client certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    /// Path to a PEM client key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Basic-auth username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Fields not interpreted by kflex (`exec`, `auth-provider`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A (cluster, user, namespace) triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Name of the cluster entry.
    #[serde(default)]
    pub cluster: String,
    /// Name of the user (auth-info) entry.
    #[serde(default, rename = "user")]
    pub auth_info: String,
    /// Default namespace for requests made through this context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Fields not interpreted by kflex.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Context {
    /// Create a context referencing the given cluster and user entries.
    #[must_use]
    pub fn new(cluster: impl Into<String>, auth_info: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            auth_info: auth_info.into(),
            ..Self::default()
        }
    }
}

/// A kubeconfig: clusters, users, and contexts keyed by name, plus the
/// currently selected context.
///
/// `current_context` is either empty or expected to name an entry of
/// `contexts`; this is not enforced, see [`CredentialDocument::dangling_references`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawKubeconfig", into = "RawKubeconfig")]
pub struct CredentialDocument {
    /// Cluster entries.
    pub clusters: BTreeMap<String, Cluster>,
    /// User entries.
    pub auth_infos: BTreeMap<String, AuthInfo>,
    /// Context entries.
    pub contexts: BTreeMap<String, Context>,
    /// Name of the selected context, or empty.
    pub current_context: String,
    /// Client preferences, passed through untouched.
    pub preferences: Option<Value>,
    /// Top-level extensions, passed through untouched.
    pub extensions: Option<Value>,
}

/// A reference inside a document that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DanglingReference {
    /// `current-context` names a context that does not exist.
    CurrentContext(String),
    /// A context names a cluster that does not exist.
    Cluster {
        /// The referring context.
        context: String,
        /// The missing cluster.
        cluster: String,
    },
    /// A context names a user that does not exist.
    AuthInfo {
        /// The referring context.
        context: String,
        /// The missing user.
        auth_info: String,
    },
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentContext(name) => write!(f, "current-context {name:?} does not exist"),
            Self::Cluster { context, cluster } => {
                write!(f, "context {context:?} references missing cluster {cluster:?}")
            }
            Self::AuthInfo { context, auth_info } => {
                write!(f, "context {context:?} references missing user {auth_info:?}")
            }
        }
    }
}

impl CredentialDocument {
    /// Check whether the document has no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
            && self.auth_infos.is_empty()
            && self.contexts.is_empty()
            && self.current_context.is_empty()
    }

    /// The currently selected context, if it exists.
    #[must_use]
    pub fn current(&self) -> Option<&Context> {
        self.contexts.get(&self.current_context)
    }

    /// List references that do not resolve within this document.
    ///
    /// Empty references are not reported.
    #[must_use]
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let mut dangling = Vec::new();

        if !self.current_context.is_empty() && !self.contexts.contains_key(&self.current_context)
        {
            dangling.push(DanglingReference::CurrentContext(
                self.current_context.clone(),
            ));
        }

        for (name, context) in &self.contexts {
            if !context.cluster.is_empty() && !self.clusters.contains_key(&context.cluster) {
                dangling.push(DanglingReference::Cluster {
                    context: name.clone(),
                    cluster: context.cluster.clone(),
                });
            }
            if !context.auth_info.is_empty() && !self.auth_infos.contains_key(&context.auth_info) {
                dangling.push(DanglingReference::AuthInfo {
                    context: name.clone(),
                    auth_info: context.auth_info.clone(),
                });
            }
        }

        dangling
    }
}

// =============================================================================
// Wire format
// =============================================================================

/// A list on the wire named the same entry twice.
#[derive(Debug, Error)]
#[error("duplicate {list} entry {name:?}")]
pub struct DuplicateEntry {
    list: &'static str,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct RawKubeconfig {
    #[serde(rename = "apiVersion", default = "default_api_version")]
    api_version: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferences: Option<Value>,
    #[serde(default)]
    clusters: Option<Vec<NamedCluster>>,
    #[serde(default)]
    users: Option<Vec<NamedAuthInfo>>,
    #[serde(default)]
    contexts: Option<Vec<NamedContext>>,
    #[serde(rename = "current-context", default)]
    current_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extensions: Option<Value>,
}

#[derive(Serialize, Deserialize)]
struct NamedCluster {
    name: String,
    #[serde(default)]
    cluster: Option<Cluster>,
}

#[derive(Serialize, Deserialize)]
struct NamedAuthInfo {
    name: String,
    #[serde(default)]
    user: Option<AuthInfo>,
}

#[derive(Serialize, Deserialize)]
struct NamedContext {
    name: String,
    #[serde(default)]
    context: Option<Context>,
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_kind() -> String {
    KIND.to_string()
}

fn collect_unique<V>(
    list: &'static str,
    entries: impl IntoIterator<Item = (String, V)>,
) -> Result<BTreeMap<String, V>, DuplicateEntry> {
    let mut map = BTreeMap::new();
    for (name, value) in entries {
        if map.contains_key(&name) {
            return Err(DuplicateEntry { list, name });
        }
        map.insert(name, value);
    }
    Ok(map)
}

impl TryFrom<RawKubeconfig> for CredentialDocument {
    type Error = DuplicateEntry;

    fn try_from(raw: RawKubeconfig) -> Result<Self, Self::Error> {
        Ok(Self {
            clusters: collect_unique(
                "cluster",
                raw.clusters
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| (c.name, c.cluster.unwrap_or_default())),
            )?,
            auth_infos: collect_unique(
                "user",
                raw.users
                    .unwrap_or_default()
                    .into_iter()
                    .map(|u| (u.name, u.user.unwrap_or_default())),
            )?,
            contexts: collect_unique(
                "context",
                raw.contexts
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| (c.name, c.context.unwrap_or_default())),
            )?,
            current_context: raw.current_context.unwrap_or_default(),
            preferences: raw.preferences,
            extensions: raw.extensions,
        })
    }
}

impl From<CredentialDocument> for RawKubeconfig {
    fn from(doc: CredentialDocument) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            preferences: doc.preferences,
            clusters: Some(
                doc.clusters
                    .into_iter()
                    .map(|(name, cluster)| NamedCluster {
                        name,
                        cluster: Some(cluster),
                    })
                    .collect(),
            ),
            users: Some(
                doc.auth_infos
                    .into_iter()
                    .map(|(name, user)| NamedAuthInfo {
                        name,
                        user: Some(user),
                    })
                    .collect(),
            ),
            contexts: Some(
                doc.contexts
                    .into_iter()
                    .map(|(name, context)| NamedContext {
                        name,
                        context: Some(context),
                    })
                    .collect(),
            ),
            current_context: Some(doc.current_context),
            extensions: doc.extensions,
        }
    }
}
