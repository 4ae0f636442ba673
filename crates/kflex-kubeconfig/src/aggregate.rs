//! The aggregate kubeconfig on disk.
//!
//! The aggregate is a single file shared by every control plane (and by any
//! other tool writing kubeconfigs). Loads and persists are whole-document;
//! nothing here guards against a concurrent writer in another process.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::codec;
use crate::config::KubeconfigConfig;
use crate::document::CredentialDocument;
use crate::error::{KubeconfigError, Result};

/// Loads and persists the aggregate kubeconfig at a fixed path.
#[derive(Debug, Clone)]
pub struct AggregateStore {
    path: PathBuf,
}

impl AggregateStore {
    /// Create a store for the kubeconfig at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create a store for the configured aggregate path.
    #[must_use]
    pub fn from_config(config: &KubeconfigConfig) -> Self {
        Self::new(config.aggregate_path())
    }

    /// Path of the aggregate kubeconfig.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the aggregate kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::NotFound` if the file does not exist,
    /// `KubeconfigError::Io` if it cannot be read, or
    /// `KubeconfigError::Decode` if it is malformed.
    pub fn load(&self) -> Result<CredentialDocument> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(KubeconfigError::NotFound(format!(
                    "kubeconfig {}",
                    self.path.display()
                )));
            }
            Err(e) => {
                return Err(KubeconfigError::Io(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        let doc = codec::decode(&bytes)?;
        debug!(
            path = %self.path.display(),
            clusters = doc.clusters.len(),
            contexts = doc.contexts.len(),
            "Loaded aggregate kubeconfig"
        );
        Ok(doc)
    }

    /// Load the aggregate kubeconfig, treating a missing file as empty.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::Io` or `KubeconfigError::Decode` if the file
    /// exists but cannot be read or is malformed.
    pub fn load_or_default(&self) -> Result<CredentialDocument> {
        match self.load() {
            Err(KubeconfigError::NotFound(_)) => {
                debug!(path = %self.path.display(), "No aggregate kubeconfig yet, starting empty");
                Ok(CredentialDocument::default())
            }
            other => other,
        }
    }

    /// Overwrite the aggregate kubeconfig with `doc`.
    ///
    /// Missing parent directories are created. The document is written to a
    /// temporary file next to the target and renamed into place, so readers
    /// never observe a partially written file. If the path is a symlink, the
    /// file it points to is replaced and the link is left in place.
    ///
    /// # Errors
    ///
    /// Returns `KubeconfigError::Persist` if the file cannot be written.
    pub fn persist(&self, doc: &CredentialDocument) -> Result<()> {
        let bytes = codec::encode(doc)?;
        let persist_err =
            |e: std::io::Error| KubeconfigError::Persist(format!("{}: {e}", self.path.display()));

        let target = resolve_write_target(&self.path).map_err(persist_err)?;
        let dir = parent_dir(&target);
        std::fs::create_dir_all(dir).map_err(persist_err)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&bytes).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&target).map_err(|e| persist_err(e.error))?;

        debug!(
            path = %self.path.display(),
            target = %target.display(),
            bytes = bytes.len(),
            "Persisted aggregate kubeconfig"
        );
        Ok(())
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// The file a write to `path` should replace: `path` itself, or the file it
/// links to when it is a symlink (dangling links included).
fn resolve_write_target(path: &Path) -> std::io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(target) => Ok(target),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            match std::fs::symlink_metadata(path) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    Ok(parent_dir(path).join(std::fs::read_link(path)?))
                }
                _ => Ok(path.to_path_buf()),
            }
        }
        Err(e) => Err(e),
    }
}
