//! unhelm - Helm Release Manifest Extractor
//!
//! Helm persists every release revision as a Secret whose `release` key holds
//! a base64 encoded, gzip compressed record. This crate reverses that encoding
//! and writes each Kubernetes resource of the rendered manifest to its own
//! file, named `<kind>.<name>.yaml`.

use std::path::Path;

pub mod config;
pub mod document;
pub mod export;
pub mod release;
pub mod source;

pub use config::ClusterConfig;
pub use export::{ExportedFile, ManifestDocument, export, plan};
pub use release::{ReleaseRecord, decode, encode};
pub use source::{FileSecretSource, KubeSecretSource, SecretSource};

/// Main error type using thiserror for error handling
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Release(#[from] release::ReleaseError),

    #[error(transparent)]
    Export(#[from] export::ExportError),

    #[error(transparent)]
    Source(#[from] source::SourceError),
}

/// Broad failure classes shared by every error in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Payload is empty or not valid base64
    Encoding,
    /// Payload is not a readable gzip stream
    Compression,
    /// A release record, manifest fragment or Secret document failed to decode
    Format,
    /// Reading or writing a file failed
    Io,
    /// The requested Secret or its release data does not exist
    NotFound,
    /// The cluster could not be reached or configured
    Connection,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Release(e) => e.kind(),
            Self::Export(e) => e.kind(),
            Self::Source(e) => e.kind(),
        }
    }
}

/// Main result type using thiserror for error handling
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of [`unpack`]
#[derive(Debug, Clone, PartialEq)]
pub struct Unpacked {
    /// The decoded release record
    pub record: ReleaseRecord,
    /// Files written, in manifest order
    pub files: Vec<ExportedFile>,
}

/// Retrieve a release Secret, decode it and export its manifest into `output_dir`.
///
/// Nothing is written unless the payload decodes cleanly.
#[async_backtrace::framed]
pub async fn unpack<S, P>(source: &S, name: &str, output_dir: P) -> Result<Unpacked>
where
    S: SecretSource,
    P: AsRef<Path>,
{
    let payload = source.retrieve(name).await?;
    let record = decode(&payload)?;

    tracing::debug!(
        secret = name,
        release = record.name.as_deref().unwrap_or_default(),
        revision = record.version.unwrap_or_default(),
        "decoded release record"
    );

    let files = export(&record.manifest, output_dir.as_ref())?;
    Ok(Unpacked { record, files })
}
