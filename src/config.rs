//! Configuration for the conversion client.
//!
//! The API base address is injected here and handed to
//! [`crate::client::RemoteConversionClient`] at construction; nothing in the
//! crate reads a global address. Build via [`ClientConfig::builder()`] or use
//! [`ClientConfig::default()`] for a local development service.

use crate::client::Transport;
use crate::error::ConvertError;
use crate::progress::SessionObserver;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;

/// Default service address, matching a locally running backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";

/// Configuration for talking to the conversion service.
///
/// # Example
/// ```rust
/// use convertdocs_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://convert.example.com/api")
///     .request_timeout_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.request_timeout_secs, 300);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is appended to. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Whole-request timeout in seconds. Default: 120.
    ///
    /// Office conversions on the service side can take a while for large
    /// documents, so this is generous.
    pub request_timeout_secs: u64,

    /// TCP connect timeout in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,

    /// Optional per-file upload cap enforced before submission.
    pub max_file_bytes: Option<u64>,

    /// Pre-constructed transport. Takes precedence over the HTTP transport
    /// built from `base_url`.
    pub transport: Option<Arc<dyn Transport>>,

    /// Receives session and request events.
    pub observer: Option<Arc<dyn SessionObserver>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            connect_timeout_secs: 10,
            user_agent: concat!("convertdocs-client/", env!("CARGO_PKG_VERSION")).to_string(),
            max_file_bytes: None,
            transport: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn Transport>"))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn SessionObserver>"))
            .finish()
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Join an endpoint path onto the base URL.
    pub fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn max_file_bytes(mut self, limit: u64) -> Self {
        self.config.max_file_bytes = Some(limit);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, ConvertError> {
        let c = &self.config;
        let url = Url::parse(&c.base_url).map_err(|e| {
            ConvertError::InvalidConfig(format!("base URL '{}' is not valid: {e}", c.base_url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConvertError::InvalidConfig(format!(
                "base URL must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_file_bytes == Some(0) {
            return Err(ConvertError::InvalidConfig(
                "Upload limit must be ≥ 1 byte".into(),
            ));
        }
        Ok(self.config)
    }
}
