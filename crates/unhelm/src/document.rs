//! Structured document decoding shared by release records and manifest fragments

use serde::de::DeserializeOwned;

#[derive(thiserror::Error, Debug)]
pub enum DocumentError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Decode `raw` as JSON when its first non-whitespace byte is `{`, as YAML otherwise
pub fn from_yaml_or_json<T: DeserializeOwned>(raw: &[u8]) -> Result<T, DocumentError> {
    let is_json = raw
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'{');

    if is_json {
        Ok(serde_json::from_slice(raw)?)
    } else {
        Ok(serde_yaml::from_slice(raw)?)
    }
}

/// True when `text` holds nothing but whitespace and `#` comments
pub fn is_blank(text: &str) -> bool {
    text.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#')
    })
}
