//! Result presentation: naming and saving a finished conversion.
//!
//! The download name is always `converted_<basename>.<target_format>`, where
//! `<basename>` is the first input's name with its final extension stripped
//! once (`a.tar.gz` → `converted_a.tar.docx`). Saving never talks to the
//! network; it only writes the buffered payload, so it can be repeated.

use crate::acquisition::InputArtifact;
use crate::client::ConversionResult;
use crate::error::ConvertError;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Builds [`DownloadHandle`]s from successful conversions.
pub struct ResultPresenter;

impl ResultPresenter {
    /// Wrap `result` for download, naming it after the first input artifact.
    pub fn present(
        result: &ConversionResult,
        artifacts: &[InputArtifact],
    ) -> Result<DownloadHandle, ConvertError> {
        let first = artifacts
            .first()
            .ok_or_else(|| ConvertError::Internal("result has no source artifact".into()))?;
        Ok(DownloadHandle {
            filename: download_name(first.basename(), result.target_format),
            content_type: result.content_type.clone(),
            suggested_filename: result.suggested_filename.clone(),
            text: result.text.clone(),
            payload: Some(result.payload.clone()),
        })
    }
}

/// `converted_<basename>.<format>`.
pub fn download_name(basename: &str, target_format: &str) -> String {
    format!("converted_{basename}.{target_format}")
}

/// A converted payload ready to be saved.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    filename: String,
    content_type: String,
    suggested_filename: Option<String>,
    text: Option<String>,
    payload: Option<Bytes>,
}

impl DownloadHandle {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Name from the service's `Content-Disposition`, informational only.
    pub fn suggested_filename(&self) -> Option<&str> {
        self.suggested_filename.as_deref()
    }

    /// Extracted text, for text operations.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_discarded(&self) -> bool {
        self.payload.is_none()
    }

    /// The payload, unless it has been discarded.
    pub fn bytes(&self) -> Result<&Bytes, ConvertError> {
        self.payload
            .as_ref()
            .ok_or_else(|| ConvertError::ResultDiscarded {
                filename: self.filename.clone(),
            })
    }

    /// Write the payload to `dir/<filename>` and return the path.
    ///
    /// The file appears atomically: the payload goes to a temp file in the
    /// same directory which is then renamed over the target. Saving twice
    /// produces the same path and content.
    pub async fn save_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf, ConvertError> {
        let payload = self.bytes()?.clone();
        let dir = dir.as_ref().to_path_buf();
        let target = dir.join(&self.filename);

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ConvertError::OutputWriteFailed {
                path: dir.clone(),
                source: e,
            })?;

        let write_target = target.clone();
        tokio::task::spawn_blocking(move || write_atomic(&dir, &write_target, &payload))
            .await
            .map_err(|e| ConvertError::Internal(format!("write task failed: {e}")))??;

        info!("Saved {} ({} bytes)", target.display(), self.bytes()?.len());
        Ok(target)
    }

    /// Release the buffered payload. Later saves fail with
    /// [`ConvertError::ResultDiscarded`].
    pub fn discard(&mut self) {
        if self.payload.take().is_some() {
            debug!("Discarded result buffer for {}", self.filename);
        }
    }
}

fn write_atomic(dir: &Path, target: &Path, payload: &[u8]) -> Result<(), ConvertError> {
    let failed = |source: std::io::Error| ConvertError::OutputWriteFailed {
        path: target.to_path_buf(),
        source,
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".convertdocs-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(failed)?;
    tmp.write_all(payload).map_err(failed)?;
    tmp.flush().map_err(failed)?;
    tmp.persist(target).map_err(|e| failed(e.error))?;
    Ok(())
}
