//! Acquisition: turn a user-supplied selection into validated artifacts.
//!
//! Nothing here touches the network. Files are checked against the limits of
//! the tool they are destined for (file count, optional size cap, accepted
//! extensions) and wrapped as [`InputArtifact`]s that a session can own.

use crate::error::ConvertError;
use crate::registry::{normalize_extension, Operation};
use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file as handed over by the user, before validation.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    /// Declared MIME type, if the source provided one.
    pub mime_type: Option<String>,
    pub data: Bytes,
}

impl RawFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            data: data.into(),
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Read a file from disk.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ConvertError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Read {} ({} bytes)", path.display(), data.len());

        Ok(Self::new(name, data))
    }
}

/// A validated input file owned by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputArtifact {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Lowercased final extension without the dot; empty when there is none.
    pub extension: String,
    #[serde(skip)]
    pub data: Bytes,
}

impl InputArtifact {
    fn from_raw(raw: RawFile) -> Self {
        let extension = extension_of(&raw.name);
        let mime_type = raw.mime_type.unwrap_or_else(|| {
            mime_guess::from_path(&raw.name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        });
        Self {
            size_bytes: raw.data.len() as u64,
            name: raw.name,
            mime_type,
            extension,
            data: raw.data,
        }
    }

    /// File name with the final extension removed once.
    pub fn basename(&self) -> &str {
        basename_of(&self.name)
    }
}

/// Per-tool selection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionLimits {
    pub max_files: usize,
    pub max_file_bytes: Option<u64>,
}

impl AcquisitionLimits {
    pub fn files(max_files: usize) -> Self {
        Self {
            max_files,
            max_file_bytes: None,
        }
    }

    pub fn for_operation(op: &Operation) -> Self {
        Self::files(op.max_files)
    }

    pub fn max_file_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_file_bytes = limit;
        self
    }
}

/// Validate a selection against a file-count limit.
pub fn accept(raw_files: Vec<RawFile>, max_files: usize) -> Result<Vec<InputArtifact>, ConvertError> {
    accept_with(raw_files, AcquisitionLimits::files(max_files))
}

/// Validate a selection against full [`AcquisitionLimits`].
pub fn accept_with(
    raw_files: Vec<RawFile>,
    limits: AcquisitionLimits,
) -> Result<Vec<InputArtifact>, ConvertError> {
    if raw_files.is_empty() {
        return Err(ConvertError::NoFilesSelected);
    }
    if raw_files.len() > limits.max_files {
        return Err(ConvertError::TooManyFiles {
            count: raw_files.len(),
            max: limits.max_files,
        });
    }
    if let Some(limit) = limits.max_file_bytes {
        if let Some(big) = raw_files.iter().find(|f| f.data.len() as u64 > limit) {
            return Err(ConvertError::FileTooLarge {
                name: big.name.clone(),
                size: big.data.len() as u64,
                limit,
            });
        }
    }

    let artifacts: Vec<InputArtifact> = raw_files.into_iter().map(InputArtifact::from_raw).collect();
    debug!("Accepted {} file(s)", artifacts.len());
    Ok(artifacts)
}

/// Validate a selection for a specific tool: its file limit and its
/// accepted extensions.
pub fn accept_for(
    raw_files: Vec<RawFile>,
    operation: &Operation,
    max_file_bytes: Option<u64>,
) -> Result<Vec<InputArtifact>, ConvertError> {
    let limits = AcquisitionLimits::for_operation(operation).max_file_bytes(max_file_bytes);
    let artifacts = accept_with(raw_files, limits)?;
    if let Some(bad) = artifacts.iter().find(|a| !operation.accepts(&a.extension)) {
        return Err(ConvertError::UnsupportedExtension {
            name: bad.name.clone(),
            extension: bad.extension.clone(),
            operation: operation.id.to_string(),
        });
    }
    Ok(artifacts)
}

/// Read every path and validate the result for `operation`, or for a
/// single-file selection when no operation is pinned.
pub async fn accept_paths(
    paths: &[PathBuf],
    operation: Option<&Operation>,
    max_file_bytes: Option<u64>,
) -> Result<Vec<InputArtifact>, ConvertError> {
    let mut raw = Vec::with_capacity(paths.len());
    for p in paths {
        raw.push(RawFile::from_path(p).await?);
    }
    match operation {
        Some(op) => accept_for(raw, op, max_file_bytes),
        None => accept_with(raw, AcquisitionLimits::files(1).max_file_bytes(max_file_bytes)),
    }
}

/// Lowercased extension after the last separating dot.
///
/// A leading dot (`.bashrc`) does not separate an extension.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

/// Final path component of `name` with its extension stripped once:
/// `a.tar.gz` → `a.tar`, `dir/a.pdf` → `a`.
pub fn basename_of(name: &str) -> &str {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::CapabilityRegistry;

    fn files(names: &[&str]) -> Vec<RawFile> {
        names.iter().map(|n| RawFile::new(*n, b"data".to_vec())).collect()
    }

    #[test]
    fn empty_selection_is_rejected() {
        let err = accept(vec![], 1).unwrap_err();
        assert!(matches!(err, ConvertError::NoFilesSelected));
    }

    #[test]
    fn too_many_files() {
        let err = accept(files(&["a.pdf", "b.pdf", "c.pdf"]), 1).unwrap_err();
        assert!(matches!(err, ConvertError::TooManyFiles { count: 3, max: 1 }));
    }

    #[test]
    fn merge_accepts_up_to_ten() {
        let names: Vec<String> = (0..10).map(|i| format!("part{i}.pdf")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        assert_eq!(accept(files(&refs), 10).unwrap().len(), 10);
    }

    #[test]
    fn artifact_fields_are_derived() {
        let a = accept(files(&["Report.PDF"]), 1).unwrap().remove(0);
        assert_eq!(a.extension, "pdf");
        assert_eq!(a.size_bytes, 4);
        assert_eq!(a.mime_type, "application/pdf");
        assert_eq!(a.basename(), "Report");
    }

    #[test]
    fn declared_mime_type_wins() {
        let raw = RawFile::new("scan.bin", b"x".to_vec()).with_mime_type("image/png");
        let a = accept(vec![raw], 1).unwrap().remove(0);
        assert_eq!(a.mime_type, "image/png");
        assert_eq!(a.extension, "bin");
    }

    #[test]
    fn basename_drops_directories() {
        assert_eq!(basename_of("dir/sub/a.pdf"), "a");
        assert_eq!(basename_of("C:\\scans\\b.tar.gz"), "b.tar");
        assert_eq!(basename_of("../up.png"), "up");
        assert_eq!(basename_of(".bashrc"), ".bashrc");
        assert_eq!(basename_of("plain"), "plain");
    }

    #[tokio::test]
    async fn accept_paths_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.pdf");
        let b = dir.path().join("b.pdf");
        std::fs::write(&a, b"%PDF-a").unwrap();
        std::fs::write(&b, b"%PDF-b").unwrap();

        let merge = CapabilityRegistry::builtin().operation("merge-pdf").unwrap();
        let got = accept_paths(&[a.clone(), b.clone()], Some(merge), None).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].name, "b.pdf");

        let err = accept_paths(&[a.clone(), b], None, None).await.unwrap_err();
        assert!(matches!(err, ConvertError::TooManyFiles { count: 2, max: 1 }));

        let err = accept_paths(&[a], None, Some(3)).await.unwrap_err();
        assert!(matches!(err, ConvertError::FileTooLarge { .. }));
    }

    #[test]
    fn size_cap_is_enforced() {
        let raw = RawFile::new("big.pdf", vec![0u8; 64]);
        let err = accept_with(vec![raw], AcquisitionLimits::files(1).max_file_bytes(Some(10)))
            .unwrap_err();
        assert!(matches!(err, ConvertError::FileTooLarge { size: 64, limit: 10, .. }));
    }

    #[test]
    fn tool_rejects_foreign_extension() {
        let op = CapabilityRegistry::builtin().operation("rotate-pdf").unwrap();
        let err = accept_for(files(&["photo.png"]), op, None).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedExtension { .. }));
        assert!(accept_for(files(&["doc.pdf"]), op, None).is_ok());
    }

    #[test]
    fn extension_and_basename_rules() {
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(basename_of("archive.tar.gz"), "archive.tar");
        assert_eq!(extension_of("README"), "");
        assert_eq!(basename_of("README"), "README");
        assert_eq!(extension_of(".bashrc"), "");
        assert_eq!(basename_of(".bashrc"), ".bashrc");
        assert_eq!(basename_of("photo.webp"), "photo");
    }

    #[tokio::test]
    async fn from_path_missing_file() {
        let err = RawFile::from_path("/definitely/not/here.pdf").await.unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn from_path_reads_name_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.docx");
        std::fs::write(&path, b"PK").unwrap();
        let raw = RawFile::from_path(&path).await.unwrap();
        assert_eq!(raw.name, "notes.docx");
        assert_eq!(&raw.data[..], b"PK");
    }
}
