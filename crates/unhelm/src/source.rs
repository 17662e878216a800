//! Release Secret retrieval
//!
//! Helm keeps each release revision in a Secret named
//! `sh.helm.release.v1.<release>.v<revision>`, with the encoded record under
//! the `release` data key. Sources hand back the bytes of that key.

use k8s_openapi::api::core::v1::Secret;
use kube::config::{KubeConfigOptions, Kubeconfig, KubeconfigError};
use kube::{Api, Client, Config};
use std::path::{Path, PathBuf};

use crate::ErrorKind;
use crate::config::ClusterConfig;
use crate::document::{DocumentError, from_yaml_or_json};

/// Data key Helm stores the encoded release under
pub const RELEASE_KEY: &str = "release";

/// Secret retrieval errors
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("Secret {name} not found in namespace {namespace}")]
    NotFound { name: String, namespace: String },

    #[error("Secret {name} has no '{key}' data")]
    MissingKey { name: String, key: String },

    #[error("Failed to load kubeconfig {}: {source}", .path.display())]
    Kubeconfig {
        path: PathBuf,
        #[source]
        source: KubeconfigError,
    },

    #[error("Failed to create Kubernetes client: {0}")]
    Client(#[source] kube::Error),

    #[error("Failed to get Secret {name} from namespace {namespace}: {source}")]
    Api {
        name: String,
        namespace: String,
        #[source]
        source: kube::Error,
    },

    #[error("Failed to read Secret file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse Secret file {}: {source}", .path.display())]
    InvalidSecret {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::MissingKey { .. } => ErrorKind::NotFound,
            Self::Kubeconfig { .. } | Self::Client(_) | Self::Api { .. } => ErrorKind::Connection,
            Self::FileRead { .. } => ErrorKind::Io,
            Self::InvalidSecret { .. } => ErrorKind::Format,
        }
    }
}

/// Something that can hand out the encoded release stored in a named Secret
#[allow(async_fn_in_trait)]
pub trait SecretSource {
    /// Return the raw `release` data of the Secret called `name`
    async fn retrieve(&self, name: &str) -> Result<Vec<u8>, SourceError>;
}

/// Pull the release payload out of a Secret, preferring `data` over `stringData`
fn release_data(secret: Secret, name: &str) -> Result<Vec<u8>, SourceError> {
    let from_data = secret
        .data
        .and_then(|mut data| data.remove(RELEASE_KEY))
        .map(|bytes| bytes.0);

    let from_string_data = || {
        secret
            .string_data
            .and_then(|mut data| data.remove(RELEASE_KEY))
            .map(String::into_bytes)
    };

    from_data
        .or_else(from_string_data)
        .ok_or_else(|| SourceError::MissingKey {
            name: name.to_string(),
            key: RELEASE_KEY.to_string(),
        })
}

/// Reads release Secrets from a live cluster
pub struct KubeSecretSource {
    api: Api<Secret>,
    namespace: String,
}

impl KubeSecretSource {
    /// Build a client from the configured kubeconfig, scoped to the configured namespace
    #[async_backtrace::framed]
    pub async fn connect(config: &ClusterConfig) -> Result<Self, SourceError> {
        let kubeconfig_error = |source| SourceError::Kubeconfig {
            path: config.kubeconfig.clone(),
            source,
        };

        let kubeconfig = Kubeconfig::read_from(&config.kubeconfig).map_err(kubeconfig_error)?;
        let client_config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(kubeconfig_error)?;
        let client = Client::try_from(client_config).map_err(SourceError::Client)?;

        tracing::debug!(
            kubeconfig = %config.kubeconfig.display(),
            namespace = %config.namespace,
            "connected to cluster"
        );

        Ok(Self::new(client, &config.namespace))
    }

    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

impl SecretSource for KubeSecretSource {
    async fn retrieve(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let secret = self.api.get(name).await.map_err(|source| match source {
            kube::Error::Api(response) if response.code == 404 => SourceError::NotFound {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            },
            source => SourceError::Api {
                name: name.to_string(),
                namespace: self.namespace.clone(),
                source,
            },
        })?;

        release_data(secret, name)
    }
}

/// Reads a release Secret saved to disk, e.g. by `kubectl get secret -o yaml`
#[derive(Debug, Clone)]
pub struct FileSecretSource {
    path: PathBuf,
}

impl FileSecretSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl SecretSource for FileSecretSource {
    async fn retrieve(&self, name: &str) -> Result<Vec<u8>, SourceError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::FileRead {
                path: self.path.clone(),
                source,
            })?;

        let secret: Secret =
            from_yaml_or_json(&raw).map_err(|source| SourceError::InvalidSecret {
                path: self.path.clone(),
                source,
            })?;

        if secret.metadata.name.as_deref() != Some(name) {
            return Err(SourceError::NotFound {
                name: name.to_string(),
                namespace: secret
                    .metadata
                    .namespace
                    .unwrap_or_else(|| crate::config::DEFAULT_NAMESPACE.to_string()),
            });
        }

        release_data(secret, name)
    }
}
