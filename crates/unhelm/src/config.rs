//! Cluster connection settings

use std::path::PathBuf;

pub const DEFAULT_NAMESPACE: &str = "default";

/// Where to find the cluster and which namespace holds the release Secrets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Path to the kubeconfig file
    pub kubeconfig: PathBuf,
    /// Namespace to read Secrets from
    pub namespace: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubeconfig: default_kubeconfig(),
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl ClusterConfig {
    pub fn new(kubeconfig: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            kubeconfig: kubeconfig.into(),
            namespace: namespace.into(),
        }
    }
}

/// `~/.kube/config`, or a relative `.kube/config` when no home directory is known
pub fn default_kubeconfig() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".kube")
        .join("config")
}
