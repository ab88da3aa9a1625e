//! # docverify-runtime
//!
//! Runs identity-document images through the verification pipeline.
//!
//! `docverify-core` is pure and deterministic. This crate wraps it with
//! the parts that touch the outside world:
//! - OCR through an external Tesseract binary
//! - QR-marker presence detection through an external zbar binary
//! - Field extraction through an OpenAI-compatible chat completion API
//! - Persistence of document status and audit payloads in SQLite
//!
//! Every external capability sits behind a trait so tests and embedders
//! can substitute their own.
//!
//! ## Important
//!
//! Marker presence is never decoded or used as proof. A passing verdict
//! means "plausible", not "authentic".
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docverify_runtime::{
//!     BinaryMarkerDetector, ImageUpload, LlmFieldExtractor, Pipeline, RuntimeConfig,
//!     SqliteStore, TesseractExtractor,
//! };
//!
//! let config = RuntimeConfig::load(None)?;
//! let pipeline = Pipeline::builder()
//!     .text_extractor(Arc::new(TesseractExtractor::new(config.ocr.clone())))
//!     .marker_detector(Arc::new(BinaryMarkerDetector::new(config.qr.clone())))
//!     .field_extractor(Arc::new(LlmFieldExtractor::unavailable()))
//!     .store(Arc::new(SqliteStore::open(&config.storage.database_path)?))
//!     .timeouts(config.stage_timeouts.clone())
//!     .build()?;
//!
//! let run = pipeline.process(&ImageUpload::from_path("card.png")?).await;
//! println!("{:?}", run.final_status);
//! ```

pub mod audit;
pub mod collaborators;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod status;
pub mod store;
pub mod upload;

pub use audit::{AuditOperation, AuditPayload, AuditTrail, AuditWrite, FailureKind, PlatformEnvelope};
pub use collaborators::{
    BinaryMarkerDetector, FieldExtractor, LlmFieldExtractor, MarkerDetector, MarkerResult,
    OcrError, TesseractExtractor, TextExtractor,
};
pub use config::{ConfigError, RuntimeConfig, StageTimeouts};
pub use orchestrator::{Pipeline, PipelineBuilder, PipelineError, PipelineRun, RunOutcome};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderRegistry,
};
pub use status::{DocumentStatus, StatusTracker, TransitionError};
pub use store::{DocumentId, DocumentRecord, DocumentStore, MemoryStore, SqliteStore, StoreError};
pub use upload::{ImageUpload, UploadError};
