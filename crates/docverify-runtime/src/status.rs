//! Per-document processing status and its transition table.
//!
//! ```text
//! UPLOADED -> OCR_RUNNING -> OCR_DONE -> QR_SCAN_RUNNING -> QR_SCAN_DONE
//!          -> LLM_RUNNING -> LLM_DONE -> VERIFY_RUNNING -> VERIFY_DONE -> COMPLETED
//!                        \-> OCR_FAILED (terminal)
//! any non-terminal state -> ERROR (terminal)
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Processing status of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    Uploaded,
    OcrRunning,
    OcrDone,
    OcrFailed,
    QrScanRunning,
    QrScanDone,
    LlmRunning,
    LlmDone,
    VerifyRunning,
    VerifyDone,
    Completed,
    Error,
}

/// Every status, in lifecycle order.
pub const ALL_STATUSES: [DocumentStatus; 12] = [
    DocumentStatus::Uploaded,
    DocumentStatus::OcrRunning,
    DocumentStatus::OcrDone,
    DocumentStatus::OcrFailed,
    DocumentStatus::QrScanRunning,
    DocumentStatus::QrScanDone,
    DocumentStatus::LlmRunning,
    DocumentStatus::LlmDone,
    DocumentStatus::VerifyRunning,
    DocumentStatus::VerifyDone,
    DocumentStatus::Completed,
    DocumentStatus::Error,
];

/// The sequence a successful run walks through.
pub const SUCCESS_PATH: [DocumentStatus; 10] = [
    DocumentStatus::Uploaded,
    DocumentStatus::OcrRunning,
    DocumentStatus::OcrDone,
    DocumentStatus::QrScanRunning,
    DocumentStatus::QrScanDone,
    DocumentStatus::LlmRunning,
    DocumentStatus::LlmDone,
    DocumentStatus::VerifyRunning,
    DocumentStatus::VerifyDone,
    DocumentStatus::Completed,
];

// A success path that breaks the transition table fails the build.
const _: () = assert!(path_is_legal(&SUCCESS_PATH));

impl DocumentStatus {
    /// Whether moving from `self` to `next` is allowed.
    pub const fn can_transition_to(self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Error) {
            return true;
        }

        matches!(
            (self, next),
            (Uploaded, OcrRunning)
                | (OcrRunning, OcrDone)
                | (OcrRunning, OcrFailed)
                | (OcrDone, QrScanRunning)
                | (QrScanRunning, QrScanDone)
                | (QrScanDone, LlmRunning)
                | (LlmRunning, LlmDone)
                | (LlmDone, VerifyRunning)
                | (VerifyRunning, VerifyDone)
                | (VerifyDone, Completed)
        )
    }

    /// Terminal statuses accept no further transitions.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            DocumentStatus::OcrFailed | DocumentStatus::Completed | DocumentStatus::Error
        )
    }

    /// Pipeline stage this status belongs to, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "upload",
            DocumentStatus::OcrRunning | DocumentStatus::OcrDone | DocumentStatus::OcrFailed => {
                "ocr"
            }
            DocumentStatus::QrScanRunning | DocumentStatus::QrScanDone => "qr_scan",
            DocumentStatus::LlmRunning | DocumentStatus::LlmDone => "llm",
            DocumentStatus::VerifyRunning | DocumentStatus::VerifyDone => "verify",
            DocumentStatus::Completed | DocumentStatus::Error => "finish",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::OcrRunning => "OCR_RUNNING",
            DocumentStatus::OcrDone => "OCR_DONE",
            DocumentStatus::OcrFailed => "OCR_FAILED",
            DocumentStatus::QrScanRunning => "QR_SCAN_RUNNING",
            DocumentStatus::QrScanDone => "QR_SCAN_DONE",
            DocumentStatus::LlmRunning => "LLM_RUNNING",
            DocumentStatus::LlmDone => "LLM_DONE",
            DocumentStatus::VerifyRunning => "VERIFY_RUNNING",
            DocumentStatus::VerifyDone => "VERIFY_DONE",
            DocumentStatus::Completed => "COMPLETED",
            DocumentStatus::Error => "ERROR",
        }
    }
}

const fn path_is_legal(path: &[DocumentStatus]) -> bool {
    let mut i = 1;
    while i < path.len() {
        if !path[i - 1].can_transition_to(path[i]) {
            return false;
        }
        i += 1;
    }
    true
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown document status '{}'", s))
    }
}

/// An attempted transition the table does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: DocumentStatus,
    pub to: DocumentStatus,
}

/// Owns the authoritative status of one pipeline run.
///
/// The tracker is the only way to move a run forward; persisting each
/// status is a separate, best-effort concern.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    current: DocumentStatus,
    history: Vec<DocumentStatus>,
}

impl StatusTracker {
    /// Start a run at UPLOADED.
    pub fn new() -> Self {
        Self {
            current: DocumentStatus::Uploaded,
            history: vec![DocumentStatus::Uploaded],
        }
    }

    pub fn current(&self) -> DocumentStatus {
        self.current
    }

    /// Every status this run has held, oldest first.
    pub fn history(&self) -> &[DocumentStatus] {
        &self.history
    }

    /// Move to `next`, or fail without changing state.
    pub fn advance(&mut self, next: DocumentStatus) -> Result<DocumentStatus, TransitionError> {
        if !self.current.can_transition_to(next) {
            return Err(TransitionError {
                from: self.current,
                to: next,
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(next)
    }

    /// Force the run into ERROR. Returns false if it had already terminated.
    pub fn fail(&mut self) -> bool {
        self.advance(DocumentStatus::Error).is_ok()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_path_is_legal() {
        let mut tracker = StatusTracker::new();
        for status in &SUCCESS_PATH[1..] {
            tracker.advance(*status).unwrap();
        }
        assert_eq!(tracker.current(), DocumentStatus::Completed);
        assert_eq!(tracker.history().len(), 10);
    }

    #[test]
    fn test_ocr_failure_is_terminal() {
        let mut tracker = StatusTracker::new();
        tracker.advance(DocumentStatus::OcrRunning).unwrap();
        tracker.advance(DocumentStatus::OcrFailed).unwrap();

        assert!(tracker.current().is_terminal());
        assert!(tracker.advance(DocumentStatus::OcrDone).is_err());
        assert!(!tracker.fail());
        assert_eq!(tracker.current(), DocumentStatus::OcrFailed);
    }

    #[test]
    fn test_error_reachable_from_every_non_terminal_state() {
        for status in ALL_STATUSES {
            assert_eq!(
                status.can_transition_to(DocumentStatus::Error),
                !status.is_terminal(),
                "{}",
                status
            );
        }
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut tracker = StatusTracker::new();
        tracker.advance(DocumentStatus::OcrRunning).unwrap();

        let err = tracker.advance(DocumentStatus::LlmRunning).unwrap_err();
        assert_eq!(
            err,
            TransitionError {
                from: DocumentStatus::OcrRunning,
                to: DocumentStatus::LlmRunning,
            }
        );
        // State is unchanged after a rejected transition
        assert_eq!(tracker.current(), DocumentStatus::OcrRunning);
    }

    #[test]
    fn test_ocr_failed_only_from_ocr_running() {
        for status in ALL_STATUSES {
            assert_eq!(
                status.can_transition_to(DocumentStatus::OcrFailed),
                status == DocumentStatus::OcrRunning
            );
        }
    }

    #[test]
    fn test_status_wire_names_round_trip() {
        for status in ALL_STATUSES {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<DocumentStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<DocumentStatus>().is_err());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = DocumentStatus> {
            (0..ALL_STATUSES.len()).prop_map(|i| ALL_STATUSES[i])
        }

        proptest! {
            #[test]
            fn prop_history_only_holds_legal_steps(steps in prop::collection::vec(any_status(), 0..40)) {
                let mut tracker = StatusTracker::new();
                for step in steps {
                    let _ = tracker.advance(step);
                }

                let history = tracker.history();
                prop_assert_eq!(history[0], DocumentStatus::Uploaded);
                prop_assert_eq!(*history.last().unwrap(), tracker.current());
                for pair in history.windows(2) {
                    prop_assert!(pair[0].can_transition_to(pair[1]));
                }
            }

            #[test]
            fn prop_terminal_states_absorb(steps in prop::collection::vec(any_status(), 0..40)) {
                let mut tracker = StatusTracker::new();
                let mut terminal_at = None;
                for step in steps {
                    let _ = tracker.advance(step);
                    if tracker.current().is_terminal() && terminal_at.is_none() {
                        terminal_at = Some(tracker.history().len());
                    }
                }

                if let Some(len) = terminal_at {
                    prop_assert_eq!(tracker.history().len(), len);
                }
            }
        }
    }
}
