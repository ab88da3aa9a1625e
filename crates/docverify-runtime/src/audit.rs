//! Audit payload and the best-effort write trail.
//!
//! A completed run produces an [`AuditPayload`]: the extracted fields plus a
//! `platform` envelope with everything the pipeline derived. Every store
//! write made along the way is recorded in an [`AuditTrail`], so a run can
//! succeed while its audit record is incomplete, and callers can tell.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docverify_core::{ClassificationResult, FieldSet, ValidationResult};

use crate::collaborators::MarkerResult;
use crate::status::DocumentStatus;

/// Persisted record of one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    #[serde(flatten)]
    pub fields: FieldSet,
    pub platform: PlatformEnvelope,
}

/// Everything the pipeline derived about a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEnvelope {
    pub doc_classification: ClassificationResult,
    pub verification: ValidationResult,
    pub qr_presence: MarkerResult,
    #[serde(with = "utc_micros")]
    pub timestamp_utc: DateTime<Utc>,
}

/// Failure categories for a run or one of its side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Text extraction produced nothing usable. The run halts at OCR_FAILED.
    InputFailure,
    /// A degradable collaborator was unavailable. The run continues.
    CapabilityUnavailable,
    /// A store write failed. Logged and ignored.
    AuditWriteFailure,
    /// Anything else. The run halts at ERROR.
    UnexpectedFailure,
}

/// A store write the pipeline attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", content = "status", rename_all = "snake_case")]
pub enum AuditOperation {
    CreateDocument,
    UpdateStatus(DocumentStatus),
    SavePayload,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOperation::CreateDocument => f.write_str("create_document"),
            AuditOperation::UpdateStatus(status) => write!(f, "update_status({})", status),
            AuditOperation::SavePayload => f.write_str("save_payload"),
        }
    }
}

/// Result of one store write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AuditWrite {
    Recorded { operation: AuditOperation },
    Failed { operation: AuditOperation, error: String },
}

impl AuditWrite {
    pub fn operation(&self) -> AuditOperation {
        match self {
            AuditWrite::Recorded { operation } | AuditWrite::Failed { operation, .. } => *operation,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditWrite::Recorded { .. })
    }
}

/// Ordered log of store writes for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrail {
    writes: Vec<AuditWrite>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a write, logging failures.
    pub fn record<E: fmt::Display>(&mut self, operation: AuditOperation, result: Result<(), E>) {
        let write = match result {
            Ok(()) => AuditWrite::Recorded { operation },
            Err(e) => {
                tracing::warn!(
                    operation = %operation,
                    error = %e,
                    kind = ?FailureKind::AuditWriteFailure,
                    "Audit write failed, continuing"
                );
                AuditWrite::Failed {
                    operation,
                    error: e.to_string(),
                }
            }
        };
        self.writes.push(write);
    }

    /// True when every attempted write succeeded.
    pub fn audit_complete(&self) -> bool {
        self.writes.iter().all(AuditWrite::is_recorded)
    }

    pub fn writes(&self) -> &[AuditWrite] {
        &self.writes
    }

    pub fn failures(&self) -> impl Iterator<Item = &AuditWrite> {
        self.writes.iter().filter(|w| !w.is_recorded())
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// `YYYY-MM-DDTHH:MM:SS.ffffffZ`
mod utc_micros {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let trimmed = raw.strip_suffix('Z').unwrap_or(&raw);
        NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}
