//! Manifest export module
//!
//! Splits a rendered manifest on `---` and writes every resource to
//! `<kind>.<name>.yaml`. Fragment text is written verbatim.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::ErrorKind;
use crate::document::{DocumentError, from_yaml_or_json, is_blank};

const SEPARATOR: &str = "---";

/// Export-specific errors
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Failed to read metadata of manifest document {index}: {source}")]
    InvalidDocument {
        index: usize,
        #[source]
        source: DocumentError,
    },

    #[error("Manifest document {index} has unusable name '{name}' for kind {kind}")]
    UnsafeName {
        index: usize,
        kind: String,
        name: String,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDocument { .. } | Self::UnsafeName { .. } => ErrorKind::Format,
            Self::Write { .. } => ErrorKind::Io,
        }
    }
}

/// Just enough of a Kubernetes object to name it
#[derive(Debug, Default, Deserialize)]
struct PartialObjectMetadata {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    metadata: Option<ObjectName>,
}

#[derive(Debug, Default, Deserialize)]
struct ObjectName {
    #[serde(default)]
    name: Option<String>,
}

/// One resource found in a manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestDocument<'a> {
    /// Position of the fragment in the manifest, counting skipped fragments
    pub index: usize,
    /// Resource kind, as written in the manifest
    pub kind: String,
    /// Resource name, empty when the document has none
    pub name: String,
    /// Fragment text between separators
    pub content: &'a str,
}

impl ManifestDocument<'_> {
    /// File name this document is exported under
    pub fn file_name(&self) -> String {
        format!("{}.{}.yaml", self.kind.to_lowercase(), self.name)
    }
}

/// A file written by [`export`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub kind: String,
    pub name: String,
    pub path: PathBuf,
}

/// Iterate the resources of `manifest` in order.
///
/// The iterator is lazy: nothing past the first error is inspected.
fn documents(manifest: &str) -> impl Iterator<Item = Result<ManifestDocument<'_>, ExportError>> {
    manifest
        .split(SEPARATOR)
        .enumerate()
        .filter(|(_, fragment)| !fragment.is_empty())
        .filter_map(|(index, fragment)| match peek(index, fragment) {
            Ok(Some(document)) => Some(Ok(document)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        })
}

fn peek(index: usize, fragment: &str) -> Result<Option<ManifestDocument<'_>>, ExportError> {
    // A `null` document peeks as empty metadata, like a blank one
    let object: PartialObjectMetadata = if is_blank(fragment) {
        PartialObjectMetadata::default()
    } else {
        from_yaml_or_json::<Option<PartialObjectMetadata>>(fragment.as_bytes())
            .map_err(|source| ExportError::InvalidDocument { index, source })?
            .unwrap_or_default()
    };

    let kind = object.kind.unwrap_or_default();
    if kind.is_empty() {
        tracing::debug!(index, "skipping manifest document without kind");
        return Ok(None);
    }

    let name = object
        .metadata
        .and_then(|metadata| metadata.name)
        .unwrap_or_default();

    if name.contains(['/', '\\']) {
        return Err(ExportError::UnsafeName { index, kind, name });
    }

    tracing::debug!(index, %kind, %name, "found manifest document");

    Ok(Some(ManifestDocument {
        index,
        kind,
        name,
        content: fragment,
    }))
}

/// List the resources `export` would write, without touching the filesystem
pub fn plan(manifest: &str) -> Result<Vec<ManifestDocument<'_>>, ExportError> {
    documents(manifest).collect()
}

/// Write every resource of `manifest` into `output_dir`.
///
/// `output_dir` must already exist. Existing files are truncated. The first
/// document that fails to decode aborts the export; files written for earlier
/// documents are left in place.
pub fn export<P: AsRef<Path>>(manifest: &str, output_dir: P) -> Result<Vec<ExportedFile>, ExportError> {
    let output_dir = output_dir.as_ref();
    let mut written = Vec::new();
    let mut seen = HashSet::new();

    for document in documents(manifest) {
        let document = document?;
        let path = output_dir.join(document.file_name());

        if !seen.insert(path.clone()) {
            tracing::warn!(
                path = %path.display(),
                "manifest contains {} {} more than once, overwriting",
                document.kind,
                document.name
            );
        }

        std::fs::write(&path, document.content).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::info!(path = %path.display(), "exported resource");

        written.push(ExportedFile {
            kind: document.kind,
            name: document.name,
            path,
        });
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use test_log::test;

    type Result<T> = std::result::Result<T, ExportError>;

    const POD: &str = "kind: Pod\nmetadata:\n  name: foo\n";

    fn resource(kind: &str, name: &str) -> String {
        format!("\napiVersion: v1\nkind: {kind}\nmetadata:\n  name: {name}\n")
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_export_single_document() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        let files = export(POD, temp_dir.path())?;

        assert_eq!(
            files,
            vec![ExportedFile {
                kind: "Pod".to_string(),
                name: "foo".to_string(),
                path: temp_dir.path().join("pod.foo.yaml"),
            }]
        );
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("pod.foo.yaml")).unwrap(),
            POD
        );

        Ok(())
    }

    #[test]
    fn test_export_splits_every_document() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let service = resource("Service", "web");
        let deployment = resource("Deployment", "web");
        let config_map = resource("ConfigMap", "web-config");
        let manifest = format!("{service}---{deployment}---{config_map}");

        let files = export(&manifest, temp_dir.path())?;

        assert_eq!(files.len(), 3);
        assert_eq!(
            file_names(temp_dir.path()),
            vec![
                "configmap.web-config.yaml",
                "deployment.web.yaml",
                "service.web.yaml"
            ]
        );
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("deployment.web.yaml")).unwrap(),
            deployment
        );

        Ok(())
    }

    #[test]
    fn test_export_skips_empty_fragments() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        let files = export(&format!("---{}", resource("Pod", "a")), temp_dir.path())?;
        assert_eq!(files.len(), 1);

        let files = export(&format!("{}---", resource("Pod", "b")), temp_dir.path())?;
        assert_eq!(files.len(), 1);

        assert_eq!(file_names(temp_dir.path()), vec!["pod.a.yaml", "pod.b.yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_skips_whitespace_only_fragment() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let manifest = format!("{POD}---\n\n");

        let documents = plan(&manifest)?;
        assert_eq!(documents.len(), 1);

        let files = export(&manifest, temp_dir.path())?;
        assert_eq!(files.len(), 1);
        assert_eq!(file_names(temp_dir.path()), vec!["pod.foo.yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_skips_comment_only_and_kindless_fragments() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let manifest = format!(
            "---\n# Source: chart/templates/disabled.yaml\n---\nfoo: bar\n---{}",
            resource("Secret", "creds")
        );

        let files = export(&manifest, temp_dir.path())?;

        assert_eq!(files.len(), 1);
        assert_eq!(file_names(temp_dir.path()), vec!["secret.creds.yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_keeps_fragment_text_verbatim() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let fragment = "\n# Source: podinfo/templates/service.yaml\nkind:   Service\nmetadata:\n  name: podinfo   \n\n\n";

        export(&format!("---{fragment}"), temp_dir.path())?;

        assert_eq!(
            std::fs::read(temp_dir.path().join("service.podinfo.yaml")).unwrap(),
            fragment.as_bytes()
        );

        Ok(())
    }

    #[test]
    fn test_export_json_document() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let fragment = r#"{"apiVersion":"v1","kind":"Namespace","metadata":{"name":"apps"}}"#;

        export(fragment, temp_dir.path())?;

        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("namespace.apps.yaml")).unwrap(),
            fragment
        );

        Ok(())
    }

    #[test]
    fn test_export_naming_lowercases_kind_only() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        export(&resource("ConfigMap", "My-App"), temp_dir.path())?;

        assert_eq!(file_names(temp_dir.path()), vec!["configmap.My-App.yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_missing_name_leaves_empty_segment() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        export("kind: Pod\nspec: {}\n", temp_dir.path())?;

        assert_eq!(file_names(temp_dir.path()), vec!["pod..yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_is_idempotent() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let manifest = format!("{}---{}", resource("Service", "a"), resource("Pod", "b"));

        export(&manifest, temp_dir.path())?;
        let first: Vec<_> = file_names(temp_dir.path())
            .iter()
            .map(|name| std::fs::read(temp_dir.path().join(name)).unwrap())
            .collect();

        export(&manifest, temp_dir.path())?;
        let second: Vec<_> = file_names(temp_dir.path())
            .iter()
            .map(|name| std::fs::read(temp_dir.path().join(name)).unwrap())
            .collect();

        assert_eq!(first, second);
        assert_eq!(file_names(temp_dir.path()).len(), 2);

        Ok(())
    }

    #[test]
    fn test_export_truncates_existing_file() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pod.foo.yaml");
        std::fs::write(&path, "x".repeat(4096)).unwrap();

        export(POD, temp_dir.path())?;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), POD);

        Ok(())
    }

    #[test]
    fn test_export_duplicate_resource_last_wins() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let first = "\nkind: Pod\nmetadata:\n  name: dup\n# first\n";
        let second = "\nkind: Pod\nmetadata:\n  name: dup\n# second\n";

        let files = export(&format!("{first}---{second}"), temp_dir.path())?;

        assert_eq!(files.len(), 2);
        assert_eq!(file_names(temp_dir.path()), vec!["pod.dup.yaml"]);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("pod.dup.yaml")).unwrap(),
            second
        );

        Ok(())
    }

    #[test]
    fn test_export_aborts_on_malformed_document() {
        let temp_dir = TempDir::new().unwrap();
        let manifest = format!(
            "{}---\nkind: [broken\n---{}",
            resource("Pod", "before"),
            resource("Pod", "after")
        );

        let error = export(&manifest, temp_dir.path()).unwrap_err();

        assert!(matches!(error, ExportError::InvalidDocument { index: 1, .. }));
        assert_eq!(error.kind(), ErrorKind::Format);
        assert_eq!(file_names(temp_dir.path()), vec!["pod.before.yaml"]);
    }

    #[test]
    fn test_export_rejects_scalar_document() {
        let temp_dir = TempDir::new().unwrap();

        let error = export("just some text", temp_dir.path()).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Format);
        assert!(file_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_export_rejects_path_like_names() {
        let temp_dir = TempDir::new().unwrap();

        for name in ["../escape", "a/b", "a\\\\b"] {
            let manifest = format!("kind: Pod\nmetadata:\n  name: \"{name}\"\n");
            let error = export(&manifest, temp_dir.path()).unwrap_err();

            assert!(matches!(error, ExportError::UnsafeName { .. }), "{name}");
            assert_eq!(error.kind(), ErrorKind::Format);
        }
        assert!(file_names(temp_dir.path()).is_empty());
    }

    #[test]
    fn test_export_keeps_dot_names_inside_output_dir() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        export("kind: Pod\nmetadata:\n  name: \"..\"\n", temp_dir.path())?;

        assert_eq!(file_names(temp_dir.path()), vec!["pod....yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_skips_null_document() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        for null in ["null", "~"] {
            let manifest = format!("kind: Pod\nmetadata:\n  name: a\n---\n{null}\n");
            let files = export(&manifest, temp_dir.path())?;
            assert_eq!(files.len(), 1, "{null}");
        }
        assert_eq!(file_names(temp_dir.path()), vec!["pod.a.yaml"]);

        Ok(())
    }

    #[test]
    fn test_export_into_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing");

        let error = export(POD, &missing).unwrap_err();

        assert!(matches!(error, ExportError::Write { ref path, .. } if path == &missing.join("pod.foo.yaml")));
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(!missing.exists());
    }

    #[test]
    fn test_plan_reports_documents_in_order() -> Result<()> {
        let manifest = format!("---{}---{}", resource("Service", "a"), resource("Pod", "b"));

        let documents = plan(&manifest)?;

        let summary: Vec<_> = documents
            .iter()
            .map(|document| (document.index, document.file_name()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "service.a.yaml".to_string()),
                (2, "pod.b.yaml".to_string())
            ]
        );

        Ok(())
    }

    #[test]
    fn test_empty_manifest_exports_nothing() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();

        assert!(export("", temp_dir.path())?.is_empty());
        assert!(file_names(temp_dir.path()).is_empty());

        Ok(())
    }
}
