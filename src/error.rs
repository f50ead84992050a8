//! Error types for the convertdocs-client library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — returned directly from an operation that was refused
//!   or failed (no files, wrong state, missing parameter, write failure).
//!   Refusals detected before any network call leave the session exactly
//!   where it was.
//!
//! * [`ConversionFailure`] — the outcome of a submission that reached the
//!   remote service (or tried to). It is stored inside the `Failed` session
//!   state so the message can be shown until the session is reset.
//!
//! Every error here is recoverable: `reset()` followed by a fresh selection
//! always gets a session back to a usable state.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the convertdocs-client library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The selection was empty.
    #[error("No files selected.\nChoose at least one file to convert.")]
    NoFilesSelected,

    /// More files were supplied than the tool accepts.
    #[error("Too many files: {count} selected, this tool accepts at most {max}")]
    TooManyFiles { count: usize, max: usize },

    /// The file type is not accepted by the chosen tool.
    #[error("'{name}' has unsupported extension '{extension}' for {operation}")]
    UnsupportedExtension {
        name: String,
        extension: String,
        operation: String,
    },

    /// A file exceeds the configured upload cap.
    #[error("'{name}' is {size} bytes, the upload limit is {limit} bytes")]
    FileTooLarge { name: String, size: u64, limit: u64 },

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    // ── Validation errors ─────────────────────────────────────────────────
    /// A required extra parameter has no value.
    #[error("Missing required parameter '{name}' for {operation}")]
    MissingParameter { operation: String, name: String },

    /// The parameter is not part of the operation's schema.
    #[error("Unknown parameter '{name}' for {operation}")]
    UnknownParameter { operation: String, name: String },

    /// A select parameter got a value outside its options.
    #[error("Invalid value '{value}' for parameter '{name}' (expected one of: {allowed})")]
    InvalidParameterValue {
        name: String,
        value: String,
        allowed: String,
    },

    // ── State errors ──────────────────────────────────────────────────────
    /// The event is not valid in the session's current state.
    #[error("Cannot {event} while the session is {state}")]
    IllegalState { state: String, event: String },

    /// The operation is not offered for the selected file's extension.
    #[error("Operation '{operation}' is not available for '.{extension}' files")]
    InvalidOperation { operation: String, extension: String },

    /// No operation with this id exists in the registry.
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// No usable response: connection failure, timeout, or malformed body.
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// The conversion service reported a failure.
    #[error("{message}")]
    Service { message: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// The result buffer was already released.
    #[error("Result '{filename}' was discarded and can no longer be downloaded")]
    ResultDiscarded { filename: String },

    /// Could not create or write the downloaded file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Validation,
    IllegalState,
    Network,
    Service,
    Output,
    Config,
    Internal,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::NoFilesSelected
            | ConvertError::TooManyFiles { .. }
            | ConvertError::UnsupportedExtension { .. }
            | ConvertError::FileTooLarge { .. }
            | ConvertError::FileNotFound { .. }
            | ConvertError::PermissionDenied { .. } => ErrorKind::Input,
            ConvertError::MissingParameter { .. }
            | ConvertError::UnknownParameter { .. }
            | ConvertError::InvalidParameterValue { .. } => ErrorKind::Validation,
            ConvertError::IllegalState { .. }
            | ConvertError::InvalidOperation { .. }
            | ConvertError::UnknownOperation(_) => ErrorKind::IllegalState,
            ConvertError::Network { .. } => ErrorKind::Network,
            ConvertError::Service { .. } => ErrorKind::Service,
            ConvertError::ResultDiscarded { .. } | ConvertError::OutputWriteFailed { .. } => {
                ErrorKind::Output
            }
            ConvertError::InvalidConfig(_) => ErrorKind::Config,
            ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn illegal_state(state: impl ToString, event: impl Into<String>) -> Self {
        ConvertError::IllegalState {
            state: state.to_string(),
            event: event.into(),
        }
    }
}

/// Outcome of a submission that did not produce a result.
///
/// Stored in the `Failed` session state, so it is cheap to clone and
/// serialisable for `--json` output.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionFailure {
    /// Transport-level failure: no response or an unreadable body.
    #[error("Network error: {reason}")]
    Network { reason: String },

    /// The service answered with a structured error; `message` is its `detail`.
    #[error("{message}")]
    Service { message: String },

    /// The owning session was reset before the request settled.
    #[error("Request cancelled")]
    Cancelled,
}

impl ConversionFailure {
    /// The text shown to the user.
    pub fn message(&self) -> String {
        match self {
            ConversionFailure::Service { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<ConversionFailure> for ConvertError {
    fn from(failure: ConversionFailure) -> Self {
        match failure {
            ConversionFailure::Network { reason } => ConvertError::Network { reason },
            ConversionFailure::Service { message } => ConvertError::Service { message },
            ConversionFailure::Cancelled => ConvertError::Internal("request cancelled".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_files_display() {
        let e = ConvertError::TooManyFiles { count: 3, max: 1 };
        let msg = e.to_string();
        assert!(msg.contains("3 selected"), "got: {msg}");
        assert!(msg.contains("at most 1"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Input);
    }

    #[test]
    fn service_error_is_verbatim() {
        let e = ConvertError::Service {
            message: "corrupt file".into(),
        };
        assert_eq!(e.to_string(), "corrupt file");
        assert_eq!(e.kind(), ErrorKind::Service);
    }

    #[test]
    fn network_and_service_are_distinct() {
        let net: ConvertError = ConversionFailure::Network {
            reason: "connection refused".into(),
        }
        .into();
        let svc: ConvertError = ConversionFailure::Service {
            message: "Conversion failed".into(),
        }
        .into();
        assert_eq!(net.kind(), ErrorKind::Network);
        assert_eq!(svc.kind(), ErrorKind::Service);
    }

    #[test]
    fn invalid_operation_is_state_error() {
        let e = ConvertError::InvalidOperation {
            operation: "pdf-to-word".into(),
            extension: "zip".into(),
        };
        assert!(e.to_string().contains(".zip"));
        assert_eq!(e.kind(), ErrorKind::IllegalState);
    }

    #[test]
    fn failure_message_strips_prefix_for_service() {
        let f = ConversionFailure::Service {
            message: "corrupt file".into(),
        };
        assert_eq!(f.message(), "corrupt file");
        let n = ConversionFailure::Network {
            reason: "timed out".into(),
        };
        assert!(n.message().contains("timed out"));
    }

    #[test]
    fn failure_serialises_with_kind_tag() {
        let f = ConversionFailure::Service {
            message: "bad".into(),
        };
        let json = serde_json::to_string(&f).unwrap();
        assert!(json.contains("\"kind\":\"service\""), "got: {json}");
    }
}
