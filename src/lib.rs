//! # convertdocs-client
//!
//! Client for a remote document-conversion service: pick files, see which
//! conversions their type allows, submit one, and save the result.
//!
//! ## Flow
//!
//! ```text
//! files
//!  │
//!  ├─ 1. Acquire   validate count, size and extension → InputArtifact
//!  ├─ 2. Discover  CapabilityRegistry: extension → valid operations
//!  ├─ 3. Choose    ConversionSession: Idle → FileSelected → OperationChosen
//!  ├─ 4. Submit    RemoteConversionClient: one multipart POST, cancellable
//!  └─ 5. Present   ResultPresenter: converted_<name>.<ext>, atomic save
//! ```
//!
//! The session is a pure state machine ([`session::transition`]) driven by a
//! thin wrapper; exactly one request can be outstanding per session and late
//! answers to abandoned requests are dropped.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convertdocs_client::{ClientConfig, ConversionSession, RawFile, SessionPhase};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .base_url("http://localhost:8000/api")
//!         .build()?;
//!     let mut session = ConversionSession::new(&config)?;
//!
//!     session.accept_files(vec![RawFile::from_path("report.pdf").await?])?;
//!     for op in session.available_operations() {
//!         println!("{} → .{}", op.label, op.target_format);
//!     }
//!     session.choose_operation("pdf-to-word")?;
//!
//!     match session.submit().await? {
//!         SessionPhase::Succeeded => {
//!             let path = session.present()?.save_to_dir(".").await?;
//!             println!("saved {}", path.display());
//!         }
//!         _ => eprintln!("{}", session.error_message().unwrap_or_default()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `convertdocs` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ```toml
//! convertdocs-client = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod acquisition;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod presenter;
pub mod progress;
pub mod registry;
pub mod session;
pub mod site;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use acquisition::{accept, accept_for, accept_paths, AcquisitionLimits, InputArtifact, RawFile};
pub use client::{
    ConversionRequest, ConversionResult, FormPart, HttpTransport, RawResponse,
    RemoteConversionClient, Transport,
};
pub use config::{ClientConfig, ClientConfigBuilder, DEFAULT_BASE_URL};
pub use convert::{convert_file, convert_to_dir, inspect, Conversion, Inspection};
pub use error::{ConversionFailure, ConvertError, ErrorKind};
pub use presenter::{DownloadHandle, ResultPresenter};
pub use progress::{NoopObserver, ObserverHandle, SessionObserver};
pub use registry::{CapabilityRegistry, Endpoint, Operation, ParameterSpec, ParameterValue};
pub use session::{
    transition, ConversionSession, Effect, Event, PendingRequest, SessionPhase, SessionState,
    Settlement,
};
pub use site::{BlogPost, ContactMessage, ContactRequest, SiteClient};
