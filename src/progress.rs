//! Observer trait for scan-session events.
//!
//! Inject an [`ObserverRef`] via
//! [`crate::config::ScannerConfigBuilder::observer`] to receive state changes
//! and extraction events as the [`crate::scanner::Scanner`] drives a session.
//! The CLI uses it to show a spinner while a receipt is being analysed.
//!
//! # Example
//!
//! ```rust
//! use edgequake_receipts::{ScanObserver, ScannerConfig, ViewState};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl ScanObserver for Printer {
//!     fn on_state_change(&self, from: ViewState, to: ViewState) {
//!         eprintln!("{from:?} -> {to:?}");
//!     }
//! }
//!
//! let config = ScannerConfig::builder()
//!     .observer(Arc::new(Printer))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::AttemptError;
use crate::model::Receipt;
use crate::session::ViewState;
use std::sync::Arc;

/// Called by the scanner as a session moves through its states.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ScanObserver: Send + Sync {
    /// Called after every accepted transition that changes the view state.
    fn on_state_change(&self, from: ViewState, to: ViewState) {
        let _ = (from, to);
    }

    /// Called just before the extraction request is sent.
    ///
    /// # Arguments
    /// * `media_type` : media type of the image being sent
    /// * `encoded_len`: length of the base64 payload
    fn on_extraction_start(&self, media_type: &str, encoded_len: usize) {
        let _ = (media_type, encoded_len);
    }

    /// Called when the model returned a valid receipt.
    fn on_extraction_complete(&self, receipt: &Receipt, elapsed_ms: u64) {
        let _ = (receipt, elapsed_ms);
    }

    /// Called whenever an attempt fails, before the session returns to Home.
    fn on_attempt_error(&self, error: &AttemptError) {
        let _ = error;
    }
}

/// A no-op observer for callers that don't need events.
pub struct NoopObserver;

impl ScanObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ScannerConfig`].
pub type ObserverRef = Arc<dyn ScanObserver>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        changes: AtomicUsize,
        errors: AtomicUsize,
    }

    impl ScanObserver for Counting {
        fn on_state_change(&self, _from: ViewState, _to: ViewState) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_error(&self, _error: &AttemptError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_state_change(ViewState::Home, ViewState::Analyzing);
        o.on_extraction_start("image/jpeg", 1024);
        o.on_extraction_complete(&Receipt::default(), 10);
        o.on_attempt_error(&AttemptError::DeviceAccess {
            detail: "no device".into(),
        });
    }

    #[test]
    fn arc_dyn_observer_receives_events() {
        let counting = Arc::new(Counting {
            changes: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let o: ObserverRef = counting.clone();
        o.on_state_change(ViewState::Home, ViewState::Capturing);
        o.on_state_change(ViewState::Capturing, ViewState::Home);
        o.on_attempt_error(&AttemptError::PdfProcessing {
            detail: "bad xref".into(),
        });
        assert_eq!(counting.changes.load(Ordering::SeqCst), 2);
        assert_eq!(counting.errors.load(Ordering::SeqCst), 1);
    }
}
