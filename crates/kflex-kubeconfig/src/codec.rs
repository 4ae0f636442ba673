//! Encoding and decoding of kubeconfig payloads.

use tracing::debug;

use crate::document::CredentialDocument;
use crate::error::{KubeconfigError, Result};

/// Decode a kubeconfig payload.
///
/// Empty or whitespace-only payloads decode to an empty document.
///
/// # Errors
///
/// Returns `KubeconfigError::Decode` if the bytes are not a well-formed
/// kubeconfig, including documents that name the same entry twice.
pub fn decode(bytes: &[u8]) -> Result<CredentialDocument> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        debug!("Empty kubeconfig payload, using empty document");
        return Ok(CredentialDocument::default());
    }

    serde_yaml::from_slice(bytes).map_err(|e| KubeconfigError::Decode(e.to_string()))
}

/// Encode a document as kubeconfig YAML.
///
/// # Errors
///
/// Returns `KubeconfigError::Persist` if serialization fails.
pub fn encode(doc: &CredentialDocument) -> Result<Vec<u8>> {
    serde_yaml::to_string(doc)
        .map(String::into_bytes)
        .map_err(|e| KubeconfigError::Persist(format!("failed to encode kubeconfig: {e}")))
}
