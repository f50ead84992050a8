//! Remote conversion client: one multipart request per submission.
//!
//! Building a request and sending it are separate steps. A
//! [`ConversionRequest`] is a plain description of the multipart body (the
//! session builds it without doing any I/O), and a [`Transport`] turns it
//! into an actual HTTP exchange. [`HttpTransport`] is the reqwest
//! implementation; tests plug in a recording transport instead.
//!
//! ## Response mapping
//!
//! | Response | Outcome |
//! |---|---|
//! | 2xx, binary operation | [`ConversionResult`] with the body as payload |
//! | 2xx, text operation | `{"text": …}` parsed into a text result |
//! | non-2xx with `{"detail": …}` | [`ConversionFailure::Service`] carrying `detail` verbatim |
//! | no response, unreadable or unparseable body | [`ConversionFailure::Network`] |

use crate::acquisition::InputArtifact;
use crate::config::ClientConfig;
use crate::error::{ConversionFailure, ConvertError};
use crate::progress::ObserverHandle;
use crate::registry::{Operation, ParameterValue, ResultKind};
use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::percent_decode_str;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One field of the multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    File {
        field: &'static str,
        filename: String,
        mime_type: String,
        data: Bytes,
    },
    Text {
        name: String,
        value: String,
    },
}

/// Everything needed to perform one conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub operation: Operation,
    pub parts: Vec<FormPart>,
}

impl ConversionRequest {
    /// Describe the multipart request for `operation`.
    ///
    /// Single-file operations upload under `file`; multi-file operations
    /// repeat `files` once per artifact. Each parameter value becomes one
    /// text field.
    pub fn build(
        operation: &Operation,
        artifacts: &[InputArtifact],
        params: &[ParameterValue],
    ) -> Result<Self, ConvertError> {
        if artifacts.is_empty() {
            return Err(ConvertError::NoFilesSelected);
        }
        if artifacts.len() > operation.max_files {
            return Err(ConvertError::TooManyFiles {
                count: artifacts.len(),
                max: operation.max_files,
            });
        }

        let field = operation.upload_field();
        let mut parts: Vec<FormPart> = artifacts
            .iter()
            .map(|a| FormPart::File {
                field,
                filename: a.name.clone(),
                mime_type: a.mime_type.clone(),
                data: a.data.clone(),
            })
            .collect();
        parts.extend(params.iter().map(|p| FormPart::Text {
            name: p.name.clone(),
            value: p.value.clone(),
        }));

        Ok(Self {
            operation: operation.clone(),
            parts,
        })
    }

    pub fn endpoint_path(&self) -> &'static str {
        self.operation.endpoint.path()
    }

    /// Value of a text field, if present.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|p| match p {
            FormPart::Text { name: n, value } if n == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// File names uploaded under `field`, in order.
    pub fn file_names(&self, field: &str) -> Vec<&str> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                FormPart::File {
                    field: f, filename, ..
                } if *f == field => Some(filename.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn file_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, FormPart::File { .. }))
            .count()
    }
}

/// Raw HTTP exchange result, before interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends a [`ConversionRequest`] somewhere and returns the raw response.
///
/// Implementations return `Err` only when no response was obtained; HTTP
/// error statuses are still `Ok` and are interpreted by the client.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ConversionRequest) -> Result<RawResponse, ConversionFailure>;
}

/// reqwest-backed [`Transport`] posting multipart bodies to the service.
pub struct HttpTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConvertError::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn form(request: &ConversionRequest) -> Form {
        request.parts.iter().fold(Form::new(), |form, part| match part {
            FormPart::File {
                field,
                filename,
                mime_type,
                data,
            } => {
                let base = || Part::bytes(data.to_vec()).file_name(filename.clone());
                let file_part = base().mime_str(mime_type).unwrap_or_else(|_| base());
                form.part(*field, file_part)
            }
            FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ConversionRequest) -> Result<RawResponse, ConversionFailure> {
        let url = self.config.endpoint_url(request.endpoint_path());
        debug!("POST {} ({} parts)", url, request.parts.len());

        let response = self
            .client
            .post(&url)
            .multipart(Self::form(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ConversionFailure::Network {
                        reason: format!(
                            "request timed out after {}s",
                            self.config.request_timeout_secs
                        ),
                    }
                } else {
                    ConversionFailure::Network {
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(reqwest::header::CONTENT_TYPE);
        let content_disposition = header(reqwest::header::CONTENT_DISPOSITION);

        let body = response.bytes().await.map_err(|e| ConversionFailure::Network {
            reason: format!("failed to read response body: {e}"),
        })?;

        Ok(RawResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

/// A successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    #[serde(skip)]
    pub payload: Bytes,
    /// Filename proposed by the service, if it sent one.
    pub suggested_filename: Option<String>,
    pub content_type: String,
    /// Extension of the converted output, from the operation.
    pub target_format: &'static str,
    /// Extracted text for text operations.
    pub text: Option<String>,
}

impl ConversionResult {
    pub fn size_bytes(&self) -> usize {
        self.payload.len()
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

#[derive(Deserialize)]
struct TextBody {
    text: String,
}

/// Map a raw response onto a result or failure for `request`.
pub fn interpret(
    request: &ConversionRequest,
    response: RawResponse,
) -> Result<ConversionResult, ConversionFailure> {
    if !response.is_success() {
        return Err(match serde_json::from_slice::<ErrorBody>(&response.body) {
            Ok(ErrorBody {
                detail: serde_json::Value::String(message),
            }) => ConversionFailure::Service { message },
            Ok(ErrorBody { detail }) => ConversionFailure::Service {
                message: detail.to_string(),
            },
            Err(_) => ConversionFailure::Network {
                reason: format!("HTTP {}: malformed error body", response.status),
            },
        });
    }

    let op = &request.operation;
    match op.result {
        ResultKind::Text => {
            let parsed: TextBody =
                serde_json::from_slice(&response.body).map_err(|e| ConversionFailure::Network {
                    reason: format!("malformed text payload: {e}"),
                })?;
            Ok(ConversionResult {
                payload: Bytes::from(parsed.text.clone().into_bytes()),
                suggested_filename: None,
                content_type: op.target_mime().to_string(),
                target_format: op.target_format,
                text: Some(parsed.text),
            })
        }
        ResultKind::Binary => Ok(ConversionResult {
            suggested_filename: response
                .content_disposition
                .as_deref()
                .and_then(disposition_filename),
            content_type: response
                .content_type
                .unwrap_or_else(|| op.target_mime().to_string()),
            target_format: op.target_format,
            payload: response.body,
            text: None,
        }),
    }
}

/// Extract the filename from a `Content-Disposition` header value.
///
/// An RFC 5987 `filename*` (percent-encoded, with charset) wins over a plain
/// `filename`. Parameter names are case-insensitive.
pub fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in header.split(';').skip(1) {
        let Some((name, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename" => plain = Some(value.trim_matches('"').to_string()),
            "filename*" => extended = decode_ext_value(value),
            _ => {}
        }
    }
    extended
        .filter(|n| !n.is_empty())
        .or(plain.filter(|n| !n.is_empty()))
}

/// Decode `charset'lang'pct-encoded` as used by `filename*`.
fn decode_ext_value(value: &str) -> Option<String> {
    let mut pieces = value.trim_matches('"').splitn(3, '\'');
    let charset = pieces.next()?.to_ascii_lowercase();
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    let bytes = percent_decode_str(encoded);
    match charset.as_str() {
        "utf-8" => bytes.decode_utf8().ok().map(|c| c.into_owned()),
        "iso-8859-1" => Some(bytes.map(char::from).collect()),
        _ => None,
    }
}

/// Issues conversion requests through a [`Transport`].
#[derive(Clone)]
pub struct RemoteConversionClient {
    transport: Arc<dyn Transport>,
    observer: Option<ObserverHandle>,
}

impl RemoteConversionClient {
    /// Build a client from config: the configured transport if any,
    /// otherwise an [`HttpTransport`] for `config.base_url`.
    pub fn new(config: &ClientConfig) -> Result<Self, ConvertError> {
        let transport: Arc<dyn Transport> = match config.transport {
            Some(ref t) => Arc::clone(t),
            None => Arc::new(HttpTransport::new(config)?),
        };
        Ok(Self {
            transport,
            observer: config.observer.clone(),
        })
    }

    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            observer: None,
        }
    }

    /// Build and send a request for `operation` in one step.
    pub async fn submit(
        &self,
        operation: &Operation,
        artifacts: &[InputArtifact],
        params: &[ParameterValue],
    ) -> Result<ConversionResult, ConvertError> {
        let request = ConversionRequest::build(operation, artifacts, params)?;
        self.send(&request, &CancellationToken::new())
            .await
            .map_err(ConvertError::from)
    }

    /// Send a prepared request. Resolves to [`ConversionFailure::Cancelled`]
    /// as soon as `cancel` fires, dropping the in-flight exchange.
    pub async fn send(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionResult, ConversionFailure> {
        let op_id = request.operation.id;
        let start = Instant::now();
        info!(
            "Submitting {} ({} file(s)) to {}",
            op_id,
            request.file_count(),
            request.endpoint_path()
        );
        if let Some(ref o) = self.observer {
            o.on_submit(op_id, request.endpoint_path(), request.file_count());
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConversionFailure::Cancelled),
            sent = self.transport.send(request) => sent.and_then(|resp| interpret(request, resp)),
        };

        match &outcome {
            Ok(result) => {
                info!(
                    "{} finished: {} bytes in {}ms",
                    op_id,
                    result.size_bytes(),
                    start.elapsed().as_millis()
                );
                if let Some(ref o) = self.observer {
                    o.on_success(op_id, result.size_bytes());
                }
            }
            Err(ConversionFailure::Cancelled) => debug!("{} cancelled", op_id),
            Err(failure) => {
                warn!("{} failed: {}", op_id, failure);
                if let Some(ref o) = self.observer {
                    o.on_failure(op_id, &failure.message());
                }
            }
        }
        outcome
    }
}
