//! View-state machine for one scanning session.
//!
//! A [`Session`] holds everything a front end needs to draw: the current
//! [`ViewState`], the receipt under review, the single dismissible error slot
//! and the append-only history. It performs no I/O. Every transition is a
//! pure function `Session::apply(self, Event) -> Session`; the async work
//! (reading files, grabbing frames, calling the model) lives in
//! [`crate::scanner`], which feeds the outcomes back in as events.
//!
//! ```text
//!   Home ──OpenCamera──▶ Capturing ──Submit──▶ Analyzing ──Extracted──▶ Reviewing
//!   Home ──Submit (file)─────────────────────▶ Analyzing
//!   Capturing ──CancelCamera──▶ Home
//!   Home | Capturing | Analyzing ──Fail──▶ Home (error set)
//!   Reviewing ──Accept | Discard──▶ Home
//! ```
//!
//! Events that are not valid in the current state leave the session
//! unchanged. In particular `Submit` is refused while `Analyzing`, so at most
//! one extraction can be in flight.

use crate::error::AttemptError;
use crate::model::{running_total, Receipt};
use serde::Serialize;
use tracing::debug;

/// Which screen the session is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ViewState {
    /// Idle; waiting for a camera or file trigger.
    #[default]
    Home,
    /// Camera stream is open, waiting for capture or cancel.
    Capturing,
    /// Extraction is in flight.
    Analyzing,
    /// A receipt is displayed for accept/discard.
    Reviewing,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// User opts to use the camera.
    OpenCamera,
    /// User closes the camera without capturing.
    CancelCamera,
    /// An image was supplied: a file from Home or a confirmed capture.
    Submit,
    /// The current attempt failed.
    Fail(AttemptError),
    /// The model returned a receipt.
    Extracted(Receipt),
    /// "Try again": drop the current receipt.
    Discard,
    /// "Add next": append the current receipt to history.
    Accept,
    /// Close the error banner.
    DismissError,
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::OpenCamera => "OpenCamera",
            Event::CancelCamera => "CancelCamera",
            Event::Submit => "Submit",
            Event::Fail(_) => "Fail",
            Event::Extracted(_) => "Extracted",
            Event::Discard => "Discard",
            Event::Accept => "Accept",
            Event::DismissError => "DismissError",
        }
    }
}

/// State of one scanning session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    state: ViewState,
    current: Option<Receipt>,
    error: Option<AttemptError>,
    history: Vec<Receipt>,
}

impl Session {
    /// A fresh session: Home, no current receipt, no error, empty history.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// The receipt under review. `Some` only in [`ViewState::Reviewing`].
    pub fn current(&self) -> Option<&Receipt> {
        self.current.as_ref()
    }

    pub fn error(&self) -> Option<&AttemptError> {
        self.error.as_ref()
    }

    /// Banner text for the error slot, if any.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }

    /// Accepted receipts in acceptance order.
    pub fn history(&self) -> &[Receipt] {
        &self.history
    }

    /// Sum of history totals, missing amounts counted as zero.
    pub fn running_total(&self) -> f64 {
        running_total(&self.history)
    }

    /// Whether `event` would change anything in the current state.
    pub fn accepts(&self, event: &Event) -> bool {
        use ViewState::*;
        matches!(
            (self.state, event),
            (Home, Event::OpenCamera)
                | (Home | Capturing, Event::Submit)
                | (Capturing, Event::CancelCamera)
                | (Home | Capturing | Analyzing, Event::Fail(_))
                | (Analyzing, Event::Extracted(_))
                | (Reviewing, Event::Discard | Event::Accept)
                | (_, Event::DismissError)
        )
    }

    /// Apply `event` and return the next session.
    ///
    /// Events not valid in the current state return the session unchanged.
    pub fn apply(mut self, event: Event) -> Self {
        if !self.accepts(&event) {
            debug!("Ignoring {} in state {:?}", event.name(), self.state);
            return self;
        }

        match event {
            Event::OpenCamera => {
                self.error = None;
                self.state = ViewState::Capturing;
            }
            Event::CancelCamera => {
                self.state = ViewState::Home;
            }
            Event::Submit => {
                self.error = None;
                self.state = ViewState::Analyzing;
            }
            Event::Fail(err) => {
                self.error = Some(err);
                self.state = ViewState::Home;
            }
            Event::Extracted(receipt) => {
                self.current = Some(receipt);
                self.state = ViewState::Reviewing;
            }
            Event::Discard => {
                self.current = None;
                self.error = None;
                self.state = ViewState::Home;
            }
            Event::Accept => {
                if let Some(receipt) = self.current.take() {
                    self.history.push(receipt);
                }
                self.state = ViewState::Home;
            }
            Event::DismissError => {
                self.error = None;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(merchant: &str, total: Option<f64>) -> Receipt {
        Receipt {
            merchant: Some(merchant.to_string()),
            total_amount: total,
            ..Default::default()
        }
    }

    fn extraction_failure() -> AttemptError {
        AttemptError::Extraction {
            detail: "bad json".into(),
        }
    }

    /// Drive a full file-upload flow and accept the result.
    fn scan_and_accept(s: Session, r: Receipt) -> Session {
        s.apply(Event::Submit)
            .apply(Event::Extracted(r))
            .apply(Event::Accept)
    }

    fn assert_current_only_when_reviewing(s: &Session) {
        assert_eq!(
            s.current().is_some(),
            s.state() == ViewState::Reviewing,
            "current slot out of sync with state {:?}",
            s.state()
        );
    }

    #[test]
    fn new_session_is_idle_and_empty() {
        let s = Session::new();
        assert_eq!(s.state(), ViewState::Home);
        assert!(s.current().is_none());
        assert!(s.error().is_none());
        assert!(s.history().is_empty());
        assert_eq!(s.running_total(), 0.0);
    }

    #[test]
    fn camera_flow_reaches_review() {
        let s = Session::new().apply(Event::OpenCamera);
        assert_eq!(s.state(), ViewState::Capturing);
        let s = s.apply(Event::Submit);
        assert_eq!(s.state(), ViewState::Analyzing);
        let s = s.apply(Event::Extracted(receipt("Cafe", Some(4.5))));
        assert_eq!(s.state(), ViewState::Reviewing);
        assert_eq!(s.current().and_then(|r| r.merchant.as_deref()), Some("Cafe"));
    }

    #[test]
    fn cancel_camera_returns_home() {
        let s = Session::new().apply(Event::OpenCamera).apply(Event::CancelCamera);
        assert_eq!(s.state(), ViewState::Home);
        assert!(s.error().is_none());
    }

    #[test]
    fn device_failure_returns_home_with_error() {
        let s = Session::new().apply(Event::OpenCamera).apply(Event::Fail(
            AttemptError::DeviceAccess {
                detail: "permission denied".into(),
            },
        ));
        assert_eq!(s.state(), ViewState::Home);
        assert!(s.error_message().unwrap().contains("camera"));
    }

    #[test]
    fn history_grows_in_accept_order() {
        let mut s = Session::new();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            s = scan_and_accept(s, receipt(name, Some(i as f64)));
            assert_eq!(s.history().len(), i + 1);
            assert_current_only_when_reviewing(&s);
        }
        let names: Vec<_> = s
            .history()
            .iter()
            .map(|r| r.merchant.clone().unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!((s.running_total() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn discard_never_changes_history() {
        let s = scan_and_accept(Session::new(), receipt("Keep", Some(1.0)));
        let s = s
            .apply(Event::Submit)
            .apply(Event::Extracted(receipt("Drop", Some(2.0))));
        assert_eq!(s.history().len(), 1);
        let s = s.apply(Event::Discard);
        assert_eq!(s.state(), ViewState::Home);
        assert!(s.current().is_none());
        assert_eq!(s.history().len(), 1);
    }

    #[test]
    fn failed_extraction_leaves_history_and_sets_error() {
        let s = scan_and_accept(Session::new(), receipt("Keep", None));
        let s = s.apply(Event::Submit).apply(Event::Fail(extraction_failure()));
        assert_eq!(s.state(), ViewState::Home);
        assert_eq!(s.history().len(), 1);
        assert!(!s.error_message().unwrap().is_empty());
        assert_current_only_when_reviewing(&s);
    }

    #[test]
    fn submit_is_refused_while_analyzing() {
        let s = Session::new().apply(Event::Submit);
        assert!(!s.accepts(&Event::Submit));
        assert!(!s.accepts(&Event::OpenCamera));
        let again = s.clone().apply(Event::Submit);
        assert_eq!(again, s);
    }

    #[test]
    fn new_error_replaces_prior_and_dismiss_clears_only_error() {
        let s = Session::new()
            .apply(Event::Fail(AttemptError::UnsupportedFileType {
                declared: "text/plain".into(),
            }))
            .apply(Event::Fail(extraction_failure()));
        assert_eq!(s.error(), Some(&extraction_failure()));

        let s = scan_and_accept(s, receipt("X", Some(3.0)));
        let s = s.apply(Event::Fail(extraction_failure()));
        let dismissed = s.clone().apply(Event::DismissError);
        assert!(dismissed.error().is_none());
        assert_eq!(dismissed.state(), s.state());
        assert_eq!(dismissed.history(), s.history());
    }

    #[test]
    fn submit_clears_stale_error() {
        let s = Session::new()
            .apply(Event::Fail(extraction_failure()))
            .apply(Event::Submit);
        assert!(s.error().is_none());
    }

    #[test]
    fn review_actions_ignored_outside_reviewing() {
        let s = Session::new();
        assert_eq!(s.clone().apply(Event::Accept), s);
        assert_eq!(s.clone().apply(Event::Discard), s);
        assert_eq!(s.clone().apply(Event::Extracted(Receipt::default())), s);
    }

    #[test]
    fn fail_is_ignored_while_reviewing() {
        let s = Session::new()
            .apply(Event::Submit)
            .apply(Event::Extracted(receipt("R", None)));
        let after = s.clone().apply(Event::Fail(extraction_failure()));
        assert_eq!(after, s);
    }
}
