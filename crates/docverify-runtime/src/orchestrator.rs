//! Pipeline orchestrator.
//!
//! Drives one document through OCR, marker detection, field extraction,
//! classification, and validation, advancing a [`StatusTracker`] at each
//! step. Stages run strictly in order; independent documents may run
//! concurrently through [`Pipeline::process_many`].
//!
//! Failure policy:
//! - Empty or failed OCR halts at OCR_FAILED.
//! - Marker detection and field extraction degrade to neutral defaults.
//! - Store writes are best-effort and only show up in the audit trail.
//!   They run on the blocking pool so a slow database never stalls the
//!   async workers.
//! - Anything else, including a panicking collaborator, halts at ERROR.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use thiserror::Error;
use tokio::time::timeout;
use tracing::Instrument;

use docverify_core::{assess, Assessment, FieldSet};

use crate::audit::{AuditOperation, AuditPayload, AuditTrail, FailureKind, PlatformEnvelope};
use crate::collaborators::{FieldExtractor, MarkerDetector, MarkerResult, TextExtractor};
use crate::config::StageTimeouts;
use crate::status::{DocumentStatus, StatusTracker, TransitionError};
use crate::store::{DocumentId, DocumentStore, StoreError};
use crate::upload::ImageUpload;

/// Shown to the caller when OCR produced nothing usable.
pub const OCR_FAILED_MESSAGE: &str = "OCR failed or returned empty text. Try a clearer image.";

/// Shown to the caller for any unexpected failure. Details go to the log.
pub const UNEXPECTED_FAILURE_MESSAGE: &str =
    "Processing failed unexpectedly. See logs for details.";

/// Errors that abort a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipeline not configured: {0}")]
    NotConfigured(String),

    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("Unexpected failure: {0}")]
    UnexpectedFailure(String),
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(AuditPayload),
    OcrFailed { message: String },
    Error { message: String },
}

/// Result of processing one document.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Absent when the document record could not be created
    pub document_id: Option<DocumentId>,
    pub final_status: DocumentStatus,
    pub outcome: RunOutcome,
    /// Store writes attempted during the run
    pub audit: AuditTrail,
    /// Statuses the run passed through, oldest first
    pub status_history: Vec<DocumentStatus>,
}

impl PipelineRun {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed(_))
    }

    pub fn payload(&self) -> Option<&AuditPayload> {
        match &self.outcome {
            RunOutcome::Completed(payload) => Some(payload),
            _ => None,
        }
    }

    /// Whether every store write succeeded. Independent of the outcome.
    pub fn audit_complete(&self) -> bool {
        self.audit.audit_complete()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.outcome {
            RunOutcome::Completed(_) => None,
            RunOutcome::OcrFailed { .. } => Some(FailureKind::InputFailure),
            RunOutcome::Error { .. } => Some(FailureKind::UnexpectedFailure),
        }
    }
}

/// Mutable state of one in-flight run.
struct RunState {
    document_id: Option<DocumentId>,
    tracker: StatusTracker,
    audit: AuditTrail,
}

/// The document pipeline. Build with [`PipelineBuilder`].
pub struct Pipeline {
    text_extractor: Arc<dyn TextExtractor>,
    marker_detector: Arc<dyn MarkerDetector>,
    field_extractor: Arc<dyn FieldExtractor>,
    store: Arc<dyn DocumentStore>,
    timeouts: StageTimeouts,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("text_extractor", &self.text_extractor.name())
            .field("marker_detector", &self.marker_detector.method())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Process one document. Never returns an error and never panics.
    pub async fn process(&self, upload: &ImageUpload) -> PipelineRun {
        let mut state = RunState {
            document_id: None,
            tracker: StatusTracker::new(),
            audit: AuditTrail::new(),
        };

        let span = tracing::info_span!("pipeline_run", filename = upload.filename());
        let result = AssertUnwindSafe(self.run_stages(upload, &mut state))
            .catch_unwind()
            .instrument(span)
            .await;

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.fail(&mut state, &e).await,
            Err(panic) => self.fail(&mut state, &panic_error(panic)).await,
        };

        PipelineRun {
            document_id: state.document_id,
            final_status: state.tracker.current(),
            outcome,
            audit: state.audit,
            status_history: state.tracker.history().to_vec(),
        }
    }

    /// Process independent documents concurrently, preserving input order.
    pub async fn process_many(&self, uploads: &[ImageUpload]) -> Vec<PipelineRun> {
        futures::future::join_all(uploads.iter().map(|upload| self.process(upload))).await
    }

    async fn run_stages(
        &self,
        upload: &ImageUpload,
        state: &mut RunState,
    ) -> Result<RunOutcome, PipelineError> {
        let filename = upload.filename().to_string();
        let created = self
            .store_call(move |store| store.create_document(&filename, DocumentStatus::Uploaded))
            .await;
        let id = match created {
            Ok(id) => {
                state.audit.record::<StoreError>(AuditOperation::CreateDocument, Ok(()));
                id
            }
            Err(e) => {
                state.audit.record(AuditOperation::CreateDocument, Err(&e));
                return Err(e.into());
            }
        };
        state.document_id = Some(id);
        tracing::info!(document_id = id, "Document registered");

        // OCR
        self.advance(state, DocumentStatus::OcrRunning).await?;
        let ocr_timeout = self.timeouts.ocr;
        let text = match timeout(ocr_timeout, self.text_extractor.extract_text(upload.path())).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => {
                tracing::warn!(document_id = id, stage = "ocr", "OCR returned no text");
                return self.halt_ocr(state).await;
            }
            Ok(Err(e)) => {
                tracing::warn!(document_id = id, stage = "ocr", error = %e, "OCR failed");
                return self.halt_ocr(state).await;
            }
            Err(_) => {
                tracing::warn!(
                    document_id = id,
                    stage = "ocr",
                    timeout = %humantime::format_duration(ocr_timeout),
                    "OCR timed out"
                );
                return self.halt_ocr(state).await;
            }
        };
        self.advance(state, DocumentStatus::OcrDone).await?;

        // Marker presence
        self.advance(state, DocumentStatus::QrScanRunning).await?;
        let qr_timeout = self.timeouts.qr_scan;
        let marker = match timeout(qr_timeout, self.marker_detector.detect_presence(upload.path())).await {
            Ok(result) => result,
            Err(_) => MarkerResult::failed(
                self.marker_detector.method(),
                format!("timed out after {}", humantime::format_duration(qr_timeout)),
            ),
        };
        if let Some(error) = &marker.error {
            tracing::warn!(
                document_id = id,
                stage = "qr_scan",
                kind = ?FailureKind::CapabilityUnavailable,
                error = %error,
                "Marker detection degraded"
            );
        }
        self.advance(state, DocumentStatus::QrScanDone).await?;

        // Field extraction
        self.advance(state, DocumentStatus::LlmRunning).await?;
        let llm_timeout = self.timeouts.llm;
        let fields = match timeout(llm_timeout, self.field_extractor.extract_fields(&text)).await {
            Ok(fields) => fields,
            Err(_) => {
                tracing::warn!(
                    document_id = id,
                    stage = "llm",
                    kind = ?FailureKind::CapabilityUnavailable,
                    timeout = %humantime::format_duration(llm_timeout),
                    "Field extraction timed out, continuing with empty fields"
                );
                FieldSet::empty()
            }
        };
        self.advance(state, DocumentStatus::LlmDone).await?;

        // Classification and validation
        self.advance(state, DocumentStatus::VerifyRunning).await?;
        let Assessment {
            classification,
            validation,
        } = assess(&text, marker.qr_present, &fields);
        tracing::info!(
            document_id = id,
            document_type = %classification.document_type,
            verdict = %validation.verdict,
            score = validation.score,
            "Document assessed"
        );
        self.advance(state, DocumentStatus::VerifyDone).await?;

        let payload = AuditPayload {
            fields,
            platform: PlatformEnvelope {
                doc_classification: classification,
                verification: validation,
                qr_presence: marker,
                timestamp_utc: Utc::now(),
            },
        };
        let stored = payload.clone();
        let saved = self
            .store_call(move |store| store.save_audit_payload(id, &stored))
            .await;
        state.audit.record(AuditOperation::SavePayload, saved);

        self.advance(state, DocumentStatus::Completed).await?;
        Ok(RunOutcome::Completed(payload))
    }

    /// Run a synchronous store call on the blocking pool.
    async fn store_call<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: FnOnce(&dyn DocumentStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || call(store.as_ref()))
            .await
            .map_err(|e| StoreError::Database(format!("store task failed: {}", e)))?
    }

    /// Move the run forward, then persist the new status best-effort.
    async fn advance(
        &self,
        state: &mut RunState,
        status: DocumentStatus,
    ) -> Result<(), PipelineError> {
        state.tracker.advance(status)?;
        self.persist_status(state, status).await;
        Ok(())
    }

    async fn persist_status(&self, state: &mut RunState, status: DocumentStatus) {
        if let Some(id) = state.document_id {
            let result = self
                .store_call(move |store| store.update_status(id, status))
                .await;
            state.audit.record(AuditOperation::UpdateStatus(status), result);
        }
        tracing::info!(
            document_id = ?state.document_id,
            status = %status,
            stage = %status.stage(),
            "Status changed"
        );
    }

    async fn halt_ocr(&self, state: &mut RunState) -> Result<RunOutcome, PipelineError> {
        self.advance(state, DocumentStatus::OcrFailed).await?;
        Ok(RunOutcome::OcrFailed {
            message: OCR_FAILED_MESSAGE.to_string(),
        })
    }

    async fn fail(&self, state: &mut RunState, error: &PipelineError) -> RunOutcome {
        tracing::error!(
            document_id = ?state.document_id,
            status = %state.tracker.current(),
            kind = ?FailureKind::UnexpectedFailure,
            error = %error,
            "Pipeline run failed"
        );
        if state.tracker.fail() {
            self.persist_status(state, DocumentStatus::Error).await;
        }
        RunOutcome::Error {
            message: UNEXPECTED_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// A caught panic is an unexpected failure like any other.
fn panic_error(panic: Box<dyn Any + Send>) -> PipelineError {
    PipelineError::UnexpectedFailure(panic_message(panic.as_ref()))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    text_extractor: Option<Arc<dyn TextExtractor>>,
    marker_detector: Option<Arc<dyn MarkerDetector>>,
    field_extractor: Option<Arc<dyn FieldExtractor>>,
    store: Option<Arc<dyn DocumentStore>>,
    timeouts: StageTimeouts,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            text_extractor: None,
            marker_detector: None,
            field_extractor: None,
            store: None,
            timeouts: StageTimeouts::default(),
        }
    }

    pub fn text_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.text_extractor = Some(extractor);
        self
    }

    pub fn marker_detector(mut self, detector: Arc<dyn MarkerDetector>) -> Self {
        self.marker_detector = Some(detector);
        self
    }

    pub fn field_extractor(mut self, extractor: Arc<dyn FieldExtractor>) -> Self {
        self.field_extractor = Some(extractor);
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Build the pipeline. Every collaborator is required.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        fn require<T: ?Sized>(value: Option<Arc<T>>, name: &str) -> Result<Arc<T>, PipelineError> {
            value.ok_or_else(|| PipelineError::NotConfigured(format!("No {} set", name)))
        }

        Ok(Pipeline {
            text_extractor: require(self.text_extractor, "text extractor")?,
            marker_detector: require(self.marker_detector, "marker detector")?,
            field_extractor: require(self.field_extractor, "field extractor")?,
            store: require(self.store, "document store")?,
            timeouts: self.timeouts,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
