//! In-process store for tests and throwaway runs.

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;

use super::{DocumentId, DocumentRecord, DocumentStore, StoreError, StoredPayload};
use crate::audit::AuditPayload;
use crate::status::DocumentStatus;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: DocumentId,
    documents: BTreeMap<DocumentId, DocumentRecord>,
    payloads: BTreeMap<DocumentId, Vec<StoredPayload>>,
    history: BTreeMap<DocumentId, Vec<DocumentStatus>>,
}

/// Store backed by maps behind a lock.
///
/// Keeps every status ever written per document, which the persistent
/// store does not.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status written for a document, oldest first.
    pub fn status_history(&self, id: DocumentId) -> Vec<DocumentStatus> {
        self.state
            .read()
            .history
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }
}

impl DocumentStore for MemoryStore {
    fn create_document(
        &self,
        filename: &str,
        status: DocumentStatus,
    ) -> Result<DocumentId, StoreError> {
        let mut state = self.state.write();
        state.next_id += 1;
        let id = state.next_id;

        state.documents.insert(
            id,
            DocumentRecord {
                id,
                filename: filename.to_string(),
                upload_time: Utc::now(),
                status,
            },
        );
        state.history.insert(id, vec![status]);
        Ok(id)
    }

    fn update_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let record = state.documents.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = status;
        state.history.entry(id).or_default().push(status);
        Ok(())
    }

    fn save_audit_payload(
        &self,
        id: DocumentId,
        payload: &AuditPayload,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if !state.documents.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        state.payloads.entry(id).or_default().push(StoredPayload {
            document_id: id,
            created_at: Utc::now(),
            payload: payload.clone(),
        });
        Ok(())
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.state.read().documents.get(&id).cloned())
    }

    fn latest_payload(&self, id: DocumentId) -> Result<Option<StoredPayload>, StoreError> {
        Ok(self
            .state
            .read()
            .payloads
            .get(&id)
            .and_then(|saved| saved.last())
            .cloned())
    }

    fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentRecord>, StoreError> {
        Ok(self
            .state
            .read()
            .documents
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::check_contract;

    #[test]
    fn test_memory_store_contract() {
        check_contract(&MemoryStore::new());
    }

    #[test]
    fn test_status_history_is_kept() {
        let store = MemoryStore::new();
        let id = store.create_document("a.png", DocumentStatus::Uploaded).unwrap();
        store.update_status(id, DocumentStatus::OcrRunning).unwrap();
        store.update_status(id, DocumentStatus::OcrFailed).unwrap();

        assert_eq!(
            store.status_history(id),
            vec![
                DocumentStatus::Uploaded,
                DocumentStatus::OcrRunning,
                DocumentStatus::OcrFailed
            ]
        );
        assert!(store.status_history(42).is_empty());
    }
}
