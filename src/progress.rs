//! Observer trait for session and request events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::config::ClientConfigBuilder::observer`] to follow a session as it
//! moves through its states and as submissions start and settle. The CLI
//! drives its spinner from these events.
//!
//! # Example
//!
//! ```rust
//! use convertdocs_client::{ClientConfig, SessionObserver, SessionPhase};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     transitions: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountingObserver {
//!     fn on_state_change(&self, _from: SessionPhase, _to: SessionPhase) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { transitions: AtomicUsize::new(0) });
//! let config = ClientConfig::builder()
//!     .observer(observer as Arc<dyn SessionObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::session::SessionPhase;
use std::sync::Arc;

/// Called by a [`crate::session::ConversionSession`] as it changes state and
/// runs submissions.
///
/// All methods default to no-ops so implementors override only what they
/// need. Sessions in different tasks may share one observer, hence
/// `Send + Sync`.
pub trait SessionObserver: Send + Sync {
    /// The session moved from one phase to another.
    fn on_state_change(&self, from: SessionPhase, to: SessionPhase) {
        let _ = (from, to);
    }

    /// A request is about to be sent.
    ///
    /// # Arguments
    /// * `operation` — operation id, e.g. `"pdf-to-word"`
    /// * `endpoint`  — endpoint path
    /// * `files`     — number of uploaded files
    fn on_submit(&self, operation: &str, endpoint: &str, files: usize) {
        let _ = (operation, endpoint, files);
    }

    /// The request returned a result of `size_bytes` bytes.
    fn on_success(&self, operation: &str, size_bytes: usize) {
        let _ = (operation, size_bytes);
    }

    /// The request failed; `message` is what the user will see.
    fn on_failure(&self, operation: &str, message: &str) {
        let _ = (operation, message);
    }

    /// A settlement arrived for a request the session no longer waits for.
    fn on_stale_settlement(&self, request_id: u64) {
        let _ = request_id;
    }
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ClientConfig`].
pub type ObserverHandle = Arc<dyn SessionObserver>;
