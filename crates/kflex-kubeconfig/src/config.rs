//! Configuration for the kubeconfig tooling.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the aggregate kubeconfig lives and how long to wait for bundles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeconfigConfig {
    /// Path of the aggregate kubeconfig.
    pub aggregate_path: PathBuf,
    /// Default timeout for bundle waits. `None` waits until cancelled.
    pub wait_timeout: Option<Duration>,
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
        Self {
            aggregate_path: home_kubeconfig(std::env::var_os("HOME").map(PathBuf::from)),
            wait_timeout: None,
        }
    }
}

impl KubeconfigConfig {
    /// Create a config pointing at the given aggregate kubeconfig.
    #[must_use]
    pub fn with_aggregate_path(path: impl Into<PathBuf>) -> Self {
        Self {
            aggregate_path: path.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Supported environment variables:
    /// - `KUBECONFIG`: the first entry of this path list is the aggregate kubeconfig
    /// - `HOME`: used for `$HOME/.kube/config` when `KUBECONFIG` is unset or empty
    /// - `KFLEX_WAIT_TIMEOUT_SECS`: default bundle wait timeout (`0` disables it)
    ///
    /// The first `KUBECONFIG` entry is used whether or not the file exists.
    /// kubectl instead writes new entries to the first listed file that
    /// exists, falling back to the last entry, so with a multi-entry
    /// `KUBECONFIG` the two tools can pick different files.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(path) = std::env::var_os("KUBECONFIG").and_then(|v| first_path_entry(&v)) {
            config.aggregate_path = path;
        }
        if let Ok(val) = std::env::var("KFLEX_WAIT_TIMEOUT_SECS") {
            config.wait_timeout = parse_timeout_secs(&val);
        }

        config
    }

    /// Path of the aggregate kubeconfig.
    #[must_use]
    pub fn aggregate_path(&self) -> &Path {
        &self.aggregate_path
    }
}

fn home_kubeconfig(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_default().join(".kube").join("config")
}

/// The first non-empty entry of a path list, existing or not.
fn first_path_entry(list: &std::ffi::OsStr) -> Option<PathBuf> {
    std::env::split_paths(list).find(|p| !p.as_os_str().is_empty())
}

fn parse_timeout_secs(val: &str) -> Option<Duration> {
    match val.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(secs) => Some(Duration::from_secs(secs)),
    }
}
