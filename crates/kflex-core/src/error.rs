//! Common error types for kflex.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout kflex.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A control-plane name is not a valid DNS-1123 label.
    #[error("invalid control plane name {name:?}: {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A control-plane type string is not recognized.
    #[error("unknown control plane type: {0}")]
    UnknownType(String),
}
