//! Document persistence.
//!
//! The pipeline writes through [`DocumentStore`] on a best-effort basis:
//! a failed write is recorded in the run's audit trail and never changes
//! the run's outcome. Reads back the audit history for a document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit::AuditPayload;
use crate::status::DocumentStatus;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Store-assigned document identifier.
pub type DocumentId = i64;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Document {0} not found")]
    NotFound(DocumentId),

    #[error("Stored data is invalid: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One uploaded document as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub filename: String,
    pub upload_time: DateTime<Utc>,
    pub status: DocumentStatus,
}

/// A saved audit payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPayload {
    pub document_id: DocumentId,
    pub created_at: DateTime<Utc>,
    pub payload: AuditPayload,
}

/// Persistence collaborator.
///
/// Implementations serialize their own writes; callers may share one
/// store across concurrent runs.
pub trait DocumentStore: Send + Sync {
    /// Create a record and return its id.
    fn create_document(
        &self,
        filename: &str,
        status: DocumentStatus,
    ) -> Result<DocumentId, StoreError>;

    fn update_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError>;

    fn save_audit_payload(&self, id: DocumentId, payload: &AuditPayload)
        -> Result<(), StoreError>;

    fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Most recently saved payload for a document.
    fn latest_payload(&self, id: DocumentId) -> Result<Option<StoredPayload>, StoreError>;

    /// Newest documents first.
    fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentRecord>, StoreError>;
}

/// Default page size for [`DocumentStore::recent_documents`].
pub const DEFAULT_RECENT_LIMIT: usize = 20;

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::collaborators::MarkerResult;
    use crate::audit::PlatformEnvelope;
    use docverify_core::{classify, validate, FieldName, FieldSet};

    pub fn payload(name: &str) -> AuditPayload {
        let fields = FieldSet::empty().with(FieldName::Name, name);
        let classification = classify("", false);
        let verification = validate(classification.document_type, &fields);
        AuditPayload {
            fields,
            platform: PlatformEnvelope {
                doc_classification: classification,
                verification,
                qr_presence: MarkerResult::scanned("test", false),
                timestamp_utc: Utc::now(),
            },
        }
    }

    /// Exercise the trait contract against any implementation.
    pub fn check_contract(store: &dyn DocumentStore) {
        let first = store.create_document("a.png", DocumentStatus::Uploaded).unwrap();
        let second = store.create_document("b.png", DocumentStatus::Uploaded).unwrap();
        assert_ne!(first, second);

        store.update_status(first, DocumentStatus::OcrRunning).unwrap();
        let record = store.get_document(first).unwrap().unwrap();
        assert_eq!(record.filename, "a.png");
        assert_eq!(record.status, DocumentStatus::OcrRunning);

        assert!(store.latest_payload(first).unwrap().is_none());
        store.save_audit_payload(first, &payload("first")).unwrap();
        store.save_audit_payload(first, &payload("second")).unwrap();
        let latest = store.latest_payload(first).unwrap().unwrap();
        assert_eq!(latest.document_id, first);
        assert_eq!(latest.payload.fields.get(FieldName::Name), Some("second"));

        let recent = store.recent_documents(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second);

        assert_eq!(store.recent_documents(1).unwrap().len(), 1);
        assert!(store.get_document(9999).unwrap().is_none());
        assert!(matches!(
            store.update_status(9999, DocumentStatus::Error),
            Err(StoreError::NotFound(9999))
        ));
        assert!(store.save_audit_payload(9999, &payload("x")).is_err());
    }
}
