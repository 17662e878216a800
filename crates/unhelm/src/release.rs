//! Release record decoding module
//!
//! Helm stores a release as JSON, gzip compressed, then base64 encoded. This
//! module undoes those layers to recover the rendered manifest.

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};

use crate::ErrorKind;
use crate::document::{DocumentError, from_yaml_or_json};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Release decoding errors
#[derive(thiserror::Error, Debug)]
pub enum ReleaseError {
    #[error("Release payload is empty")]
    EmptyPayload,

    #[error("Release payload is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Release payload is not gzip compressed (bad magic bytes)")]
    NotGzip,

    #[error("Failed to decompress release payload: {0}")]
    Decompress(#[source] std::io::Error),

    #[error("Failed to compress release record: {0}")]
    Compress(#[source] std::io::Error),

    #[error("Failed to serialize release record: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to decode release record: {0}")]
    InvalidRecord(#[from] DocumentError),
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EmptyPayload | Self::InvalidBase64(_) => ErrorKind::Encoding,
            Self::NotGzip | Self::Decompress(_) => ErrorKind::Compression,
            Self::InvalidRecord(_) | Self::Serialize(_) => ErrorKind::Format,
            Self::Compress(_) => ErrorKind::Io,
        }
    }
}

/// The parts of a stored Helm release this tool cares about
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReleaseRecord {
    /// Release name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Namespace the release was installed into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Release revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Rendered manifest, every resource separated by `---`
    #[serde(default)]
    pub manifest: String,
}

/// Decode a stored release payload into its record
pub fn decode(payload: &[u8]) -> Result<ReleaseRecord, ReleaseError> {
    let text: Vec<u8> = payload
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();

    if text.is_empty() {
        return Err(ReleaseError::EmptyPayload);
    }

    let compressed = STANDARD.decode(&text)?;
    if !compressed.starts_with(&GZIP_MAGIC) {
        return Err(ReleaseError::NotGzip);
    }

    let mut raw = Vec::new();
    MultiGzDecoder::new(compressed.as_slice())
        .read_to_end(&mut raw)
        .map_err(ReleaseError::Decompress)?;

    Ok(from_yaml_or_json(&raw)?)
}

/// Encode a record the way Helm stores it: JSON, gzip, then base64
pub fn encode(record: &ReleaseRecord) -> Result<String, ReleaseError> {
    let json = serde_json::to_vec(record).map_err(ReleaseError::Serialize)?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(ReleaseError::Compress)?;
    let compressed = encoder.finish().map_err(ReleaseError::Compress)?;

    Ok(STANDARD.encode(compressed))
}
