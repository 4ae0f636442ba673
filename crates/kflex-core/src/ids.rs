//! Control-plane identifier types.
//!
//! A control plane is addressed by its name and type. The name doubles as a
//! namespace prefix in the hosting cluster, so it is validated as a DNS-1123
//! label on construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Maximum length of a DNS-1123 label.
const MAX_NAME_LEN: usize = 63;

/// A validated control-plane name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ControlPlaneName(String);

impl ControlPlaneName {
    /// Validate and wrap a control-plane name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidName` if the name is empty, longer than 63
    /// characters, contains anything other than lowercase alphanumerics and
    /// `-`, or starts or ends with `-`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_label(&name).map_err(|reason| CoreError::InvalidName {
            name: name.clone(),
            reason,
        })?;
        Ok(Self(name))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_label(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("name must not be empty");
    }
    if name.len() > MAX_NAME_LEN {
        return Err("name must be at most 63 characters");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err("name may only contain lowercase alphanumerics and '-'");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err("name must start and end with an alphanumeric character");
    }
    Ok(())
}

impl fmt::Debug for ControlPlaneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlPlaneName({})", self.0)
    }
}

impl fmt::Display for ControlPlaneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ControlPlaneName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ControlPlaneName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<ControlPlaneName> for String {
    fn from(name: ControlPlaneName) -> Self {
        name.0
    }
}

impl AsRef<str> for ControlPlaneName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kind of control plane, which decides where its credential bundle lives
/// and which generic identifiers the bundle carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPlaneType {
    /// Plain Kubernetes API server.
    K8s,
    /// Open Cluster Management multicluster control plane.
    Ocm,
    /// Virtual cluster running inside a host namespace.
    VCluster,
    /// The hosting cluster itself.
    Host,
    /// A control plane provisioned outside kflex.
    External,
}

impl ControlPlaneType {
    /// All known control-plane types.
    pub const ALL: [Self; 5] = [Self::K8s, Self::Ocm, Self::VCluster, Self::Host, Self::External];

    /// Return the canonical lowercase name of this type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::K8s => "k8s",
            Self::Ocm => "ocm",
            Self::VCluster => "vcluster",
            Self::Host => "host",
            Self::External => "external",
        }
    }
}

impl fmt::Display for ControlPlaneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ControlPlaneType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| CoreError::UnknownType(s.to_string()))
    }
}

/// A control plane's name together with its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlPlaneIdentity {
    name: ControlPlaneName,
    #[serde(rename = "type")]
    cp_type: ControlPlaneType,
}

impl ControlPlaneIdentity {
    /// Create an identity from already-validated parts.
    #[must_use]
    pub const fn new(name: ControlPlaneName, cp_type: ControlPlaneType) -> Self {
        Self { name, cp_type }
    }

    /// Parse an identity from raw name and type strings.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or the type is unknown.
    pub fn parse(name: &str, cp_type: &str) -> Result<Self> {
        Ok(Self::new(name.parse()?, cp_type.parse()?))
    }

    /// The control-plane name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// The validated control-plane name.
    #[must_use]
    pub const fn control_plane_name(&self) -> &ControlPlaneName {
        &self.name
    }

    /// The control-plane type.
    #[must_use]
    pub const fn cp_type(&self) -> ControlPlaneType {
        self.cp_type
    }
}

impl fmt::Display for ControlPlaneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.cp_type)
    }
}
