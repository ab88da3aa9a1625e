//! External capabilities the pipeline depends on.
//!
//! Each stage talks to one trait. Text extraction may fail; marker
//! detection and field extraction always produce a value, degrading to a
//! neutral default when their backend is unavailable.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use docverify_core::FieldSet;

mod extraction;
mod marker;
mod tesseract;

pub use extraction::LlmFieldExtractor;
pub use marker::BinaryMarkerDetector;
pub use tesseract::TesseractExtractor;

/// Note attached to every marker result that did not fail.
pub const PRESENCE_ONLY_NOTE: &str = "Visual QR presence only. No decoding or validation performed.";

/// Error code for an image the detector could not open.
pub const IMAGE_READ_FAILED: &str = "image_read_failed";

/// Errors from text extraction.
#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Produces raw text from an image.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract text. An empty string means nothing was recognized.
    async fn extract_text(&self, image_path: &Path) -> Result<String, OcrError>;

    fn name(&self) -> &str;
}

/// Reports whether a machine-readable marker is visible in an image.
#[async_trait]
pub trait MarkerDetector: Send + Sync {
    /// Never fails; problems are reported inside the result.
    async fn detect_presence(&self, image_path: &Path) -> MarkerResult;

    /// Label stored in [`MarkerResult::method`].
    fn method(&self) -> &str;
}

/// Turns raw text into a normalized field record.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    /// Never fails; an unavailable backend yields [`FieldSet::empty`].
    async fn extract_fields(&self, text: &str) -> FieldSet;
}

/// Marker presence, as stored under `platform.qr_presence`.
///
/// Presence is never authoritative and content is never decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerResult {
    pub qr_present: bool,
    pub confidence: f64,
    pub method: String,
    pub authoritative: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MarkerResult {
    /// A completed scan.
    pub fn scanned(method: impl Into<String>, present: bool) -> Self {
        Self {
            qr_present: present,
            confidence: if present { 0.9 } else { 0.0 },
            method: method.into(),
            authoritative: false,
            note: Some(PRESENCE_ONLY_NOTE.to_string()),
            error: None,
        }
    }

    /// A scan that could not run.
    pub fn failed(method: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            qr_present: false,
            confidence: 0.0,
            method: method.into(),
            authoritative: false,
            note: None,
            error: Some(error.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
