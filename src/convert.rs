//! One-shot entry points built on [`ConversionSession`].
//!
//! These drive a whole session for callers that have files on disk and do not
//! need to react to intermediate states: select, choose, submit, present.

use crate::acquisition::{self, RawFile};
use crate::config::ClientConfig;
use crate::error::ConvertError;
use crate::presenter::DownloadHandle;
use crate::registry::{CapabilityRegistry, Operation, ParameterValue};
use crate::session::{ConversionSession, SessionPhase};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A finished conversion.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub operation: &'static Operation,
    pub handle: DownloadHandle,
}

/// What the registry offers for one input file.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub name: String,
    pub extension: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub operations: Vec<&'static Operation>,
}

/// Resolve the operation to run: the named one, or the first offered for
/// the first file's extension.
pub fn resolve_operation(
    paths: &[PathBuf],
    operation_id: Option<&str>,
) -> Result<&'static Operation, ConvertError> {
    let registry = CapabilityRegistry::builtin();
    if let Some(id) = operation_id {
        return registry
            .operation(id)
            .ok_or_else(|| ConvertError::UnknownOperation(id.to_string()));
    }
    let first = paths.first().ok_or(ConvertError::NoFilesSelected)?;
    let extension = path_extension(first);
    registry
        .auto_route(&extension)
        .ok_or_else(|| ConvertError::InvalidOperation {
            operation: "auto".to_string(),
            extension,
        })
}

fn path_extension(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    acquisition::extension_of(&name)
}

/// Convert `paths` with `operation_id` (or the auto-routed operation).
///
/// A single file whose extension offers the operation goes through the
/// choice-driven session; anything else (merges, tool-only operations) uses
/// a session pinned to the operation.
pub async fn convert_file(
    paths: &[PathBuf],
    operation_id: Option<&str>,
    params: &[ParameterValue],
    config: &ClientConfig,
) -> Result<Conversion, ConvertError> {
    let op = resolve_operation(paths, operation_id)?;

    let offered = match paths {
        [only] => CapabilityRegistry::builtin()
            .lookup(&path_extension(only))
            .iter()
            .any(|o| o.id == op.id),
        _ => false,
    };

    let mut session = if offered {
        let artifacts = acquisition::accept_paths(paths, None, config.max_file_bytes).await?;
        let mut s = ConversionSession::new(config)?;
        s.select_files(artifacts)?;
        s.choose_operation(op.id)?;
        s
    } else {
        debug!("Using pinned session for {}", op.id);
        let artifacts = acquisition::accept_paths(paths, Some(op), config.max_file_bytes).await?;
        let mut s = ConversionSession::for_tool(config, op.id)?;
        s.select_files(artifacts)?;
        s
    };

    for p in params {
        session.set_parameter(p.name.clone(), p.value.clone())?;
    }

    match session.submit().await? {
        SessionPhase::Succeeded => Ok(Conversion {
            operation: op,
            handle: session.present()?,
        }),
        _ => match session.failure() {
            Some(f) => Err(f.clone().into()),
            None => Err(ConvertError::Internal(format!(
                "session ended in unexpected state '{}'",
                session.phase()
            ))),
        },
    }
}

/// Convert and save the result into `output_dir`, returning the saved path.
pub async fn convert_to_dir(
    paths: &[PathBuf],
    operation_id: Option<&str>,
    params: &[ParameterValue],
    output_dir: impl AsRef<Path>,
    config: &ClientConfig,
) -> Result<PathBuf, ConvertError> {
    let conversion = convert_file(paths, operation_id, params, config).await?;
    let path = conversion.handle.save_to_dir(output_dir).await?;
    info!("{} → {}", conversion.operation.id, path.display());
    Ok(path)
}

/// List the operations offered for a file without converting it.
///
/// Does not contact the service.
pub async fn inspect(path: impl AsRef<Path>) -> Result<Inspection, ConvertError> {
    let raw = RawFile::from_path(path).await?;
    let artifact = acquisition::accept(vec![raw], 1)?.remove(0);
    let operations = CapabilityRegistry::builtin()
        .lookup(&artifact.extension)
        .to_vec();
    Ok(Inspection {
        name: artifact.name,
        extension: artifact.extension,
        mime_type: artifact.mime_type,
        size_bytes: artifact.size_bytes,
        operations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ConversionRequest, RawResponse, Transport};
    use crate::error::ConversionFailure;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder {
        replies: Mutex<VecDeque<RawResponse>>,
        seen: Mutex<Vec<ConversionRequest>>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: &ConversionRequest) -> Result<RawResponse, ConversionFailure> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ConversionFailure::Network {
                    reason: "no scripted reply".into(),
                })
        }
    }

    fn replying(status: u16, body: &'static [u8]) -> Arc<Recorder> {
        let r = Recorder::default();
        r.replies.lock().unwrap().push_back(RawResponse {
            status,
            body: Bytes::from_static(body),
            ..Default::default()
        });
        Arc::new(r)
    }

    fn config(transport: &Arc<Recorder>) -> ClientConfig {
        ClientConfig::builder()
            .transport(Arc::clone(transport) as Arc<dyn Transport>)
            .build()
            .unwrap()
    }

    fn write(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.7 input").unwrap();
        path
    }

    #[test]
    fn explicit_operation_is_resolved() {
        let op = resolve_operation(&[PathBuf::from("a.pdf")], Some("rotate-pdf")).unwrap();
        assert_eq!(op.id, "rotate-pdf");
        let err = resolve_operation(&[PathBuf::from("a.pdf")], Some("pdf-to-epub")).unwrap_err();
        assert!(matches!(err, ConvertError::UnknownOperation(_)));
    }

    #[test]
    fn auto_route_picks_first_offered() {
        let op = resolve_operation(&[PathBuf::from("/tmp/Report.PDF")], None).unwrap();
        assert_eq!(op.id, "pdf-to-word");
        let err = resolve_operation(&[PathBuf::from("notes.txt")], None).unwrap_err();
        assert!(matches!(err, ConvertError::InvalidOperation { .. }));
        assert!(resolve_operation(&[], None).is_err());
    }

    #[tokio::test]
    async fn inspect_lists_operations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.webp");
        std::fs::write(&path, b"RIFF").unwrap();
        let info = inspect(&path).await.unwrap();
        assert_eq!(info.extension, "webp");
        let ids: Vec<_> = info.operations.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec!["webp-to-jpg", "webp-to-png"]);
    }

    #[tokio::test]
    async fn inspect_unknown_extension_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hi").unwrap();
        assert!(inspect(&path).await.unwrap().operations.is_empty());
    }

    #[tokio::test]
    async fn offered_operation_uses_choice_route() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "report.pdf");
        let mock = replying(200, b"JPEGDATA");

        let conv = convert_file(&[input], Some("pdf-to-jpg"), &[], &config(&mock))
            .await
            .unwrap();
        assert_eq!(conv.operation.id, "pdf-to-jpg");
        assert_eq!(conv.handle.filename(), "converted_report.jpg");
        assert_eq!(&conv.handle.bytes().unwrap()[..], b"JPEGDATA");

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].endpoint_path(), "/convert/pdf-to-image");
        assert_eq!(seen[0].file_names("file"), vec!["report.pdf"]);
    }

    #[tokio::test]
    async fn merge_uses_pinned_route() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(dir.path(), "a.pdf"), write(dir.path(), "b.pdf")];
        let mock = replying(200, b"%PDF merged");

        let conv = convert_file(&paths, Some("merge-pdf"), &[], &config(&mock))
            .await
            .unwrap();
        assert_eq!(conv.handle.filename(), "converted_a.pdf");

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen[0].endpoint_path(), "/convert/merge-pdf");
        assert_eq!(seen[0].file_names("files"), vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn tool_parameters_are_sent() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "scan.pdf");
        let mock = replying(200, b"%PDF rotated");
        let params = vec![ParameterValue::new("rotation", "180")];

        convert_file(&[input], Some("rotate-pdf"), &params, &config(&mock))
            .await
            .unwrap();
        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen[0].endpoint_path(), "/convert/rotate-pdf");
        assert_eq!(seen[0].text_field("rotation"), Some("180"));
    }

    #[tokio::test]
    async fn service_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "report.pdf");
        let mock = replying(500, br#"{"detail":"corrupt file"}"#);

        let err = convert_file(&[input], None, &[], &config(&mock))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Service { ref message } if message == "corrupt file"));
    }

    #[tokio::test]
    async fn rejected_selection_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![write(dir.path(), "a.pdf"), write(dir.path(), "b.pdf")];
        let mock = replying(200, b"unused");

        let err = convert_file(&paths, Some("compress-pdf"), &[], &config(&mock))
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::TooManyFiles { count: 2, max: 1 }));
        assert!(mock.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn convert_to_dir_saves_result() {
        let dir = tempfile::tempdir().unwrap();
        let input = write(dir.path(), "report.pdf");
        let out = dir.path().join("out");
        let mock = replying(200, b"DOCX");

        let path = convert_to_dir(&[input], None, &[], &out, &config(&mock))
            .await
            .unwrap();
        assert_eq!(path, out.join("converted_report.docx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"DOCX");
    }
}
