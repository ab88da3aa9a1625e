//! SQLite-backed store.
//!
//! Schema:
//!   documents(
//!     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//!     filename    TEXT NOT NULL,
//!     upload_time TEXT NOT NULL,   -- RFC 3339, UTC
//!     status      TEXT NOT NULL
//!   )
//!   extractions(
//!     id             INTEGER PRIMARY KEY AUTOINCREMENT,
//!     document_id    INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
//!     extracted_data TEXT NOT NULL, -- audit payload JSON
//!     created_at     TEXT NOT NULL
//!   )

use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use super::{DocumentId, DocumentRecord, DocumentStore, StoreError, StoredPayload};
use crate::audit::AuditPayload;
use crate::status::DocumentStatus;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        filename    TEXT NOT NULL,
        upload_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        status      TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS extractions (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id    INTEGER NOT NULL,
        extracted_data TEXT NOT NULL,
        created_at     TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_documents_upload_time ON documents(upload_time);
    CREATE INDEX IF NOT EXISTS idx_extractions_document_id ON extractions(document_id);
";

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Store backed by a single SQLite connection.
///
/// The connection sits behind a mutex, so writes from concurrent runs are
/// serialized.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(db_err)?;

        let store = Self::init(conn)?;
        tracing::debug!(path = %path.display(), "Document store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accept RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format.
fn parse_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
        return Ok(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| StoreError::Corrupt(format!("unparseable timestamp '{}'", raw)))
}

fn parse_status(raw: &str) -> Result<DocumentStatus, StoreError> {
    raw.parse().map_err(StoreError::Corrupt)
}

type DocumentRow = (DocumentId, String, String, String);

fn document_from_row((id, filename, upload_time, status): DocumentRow) -> Result<DocumentRecord, StoreError> {
    Ok(DocumentRecord {
        id,
        filename,
        upload_time: parse_time(&upload_time)?,
        status: parse_status(&status)?,
    })
}

impl DocumentStore for SqliteStore {
    fn create_document(
        &self,
        filename: &str,
        status: DocumentStatus,
    ) -> Result<DocumentId, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO documents (filename, upload_time, status) VALUES (?1, ?2, ?3)",
            params![filename, now_text(), status.as_str()],
        )
        .map_err(db_err)?;
        let id = conn.last_insert_rowid();

        tracing::info!(document_id = id, filename, "Document inserted");
        Ok(id)
    }

    fn update_status(&self, id: DocumentId, status: DocumentStatus) -> Result<(), StoreError> {
        let updated = self
            .conn
            .lock()
            .execute(
                "UPDATE documents SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(db_err)?;

        if updated == 0 {
            return Err(StoreError::NotFound(id));
        }
        tracing::debug!(document_id = id, status = %status, "Status persisted");
        Ok(())
    }

    fn save_audit_payload(
        &self,
        id: DocumentId,
        payload: &AuditPayload,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(payload)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO extractions (document_id, extracted_data, created_at) VALUES (?1, ?2, ?3)",
                params![id, data, now_text()],
            )
            .map_err(db_err)?;

        tracing::info!(document_id = id, "Audit payload saved");
        Ok(())
    }

    fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        let row: Option<DocumentRow> = self
            .conn
            .lock()
            .query_row(
                "SELECT id, filename, upload_time, status FROM documents WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(db_err)?;

        row.map(document_from_row).transpose()
    }

    fn latest_payload(&self, id: DocumentId) -> Result<Option<StoredPayload>, StoreError> {
        let row: Option<(String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT extracted_data, created_at
                 FROM extractions
                 WHERE document_id = ?1
                 ORDER BY id DESC
                 LIMIT 1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((data, created_at)) = row else {
            return Ok(None);
        };

        Ok(Some(StoredPayload {
            document_id: id,
            created_at: parse_time(&created_at)?,
            payload: serde_json::from_str(&data)?,
        }))
    }

    fn recent_documents(&self, limit: usize) -> Result<Vec<DocumentRecord>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, filename, upload_time, status
                 FROM documents
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(db_err)?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(document_from_row(row.map_err(db_err)?)?);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{check_contract, payload};

    #[test]
    fn test_sqlite_store_contract() {
        check_contract(&SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verification.db");

        let id = {
            let store = SqliteStore::open(&path).unwrap();
            let id = store.create_document("card.png", DocumentStatus::Uploaded).unwrap();
            store.update_status(id, DocumentStatus::Completed).unwrap();
            store.save_audit_payload(id, &payload("Asha")).unwrap();
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        let record = store.get_document(id).unwrap().unwrap();
        assert_eq!(record.status, DocumentStatus::Completed);
        assert!(store.latest_payload(id).unwrap().is_some());
    }

    #[test]
    fn test_legacy_timestamp_format() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO documents (filename, upload_time, status) VALUES ('old.jpg', '2024-01-02 03:04:05', 'COMPLETED')",
                [],
            )
            .unwrap();

        let recent = store.recent_documents(5).unwrap();
        assert_eq!(recent[0].filename, "old.jpg");
        assert_eq!(recent[0].upload_time.to_rfc3339(), "2024-01-02T03:04:05+00:00");
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO documents (filename, upload_time, status) VALUES ('x.png', '2024-01-02 03:04:05', 'DONE')",
                [],
            )
            .unwrap();

        assert!(matches!(store.get_document(1), Err(StoreError::Corrupt(_))));
    }
}
