//! In-memory document store.
//!
//! Records live for the lifetime of the process. Every insert is stamped with a monotonically
//! increasing sequence number so listings come back in upload order.

use crate::extraction::FileKind;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Errors raised by the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same identifier already exists.
    #[error("Document {0} already exists")]
    DuplicateId(Uuid),
}

/// A processed upload.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    /// Identifier returned to the client.
    pub id: Uuid,
    /// Original filename.
    pub filename: String,
    /// Content type reported by the client, or the one inferred from the filename.
    pub file_type: String,
    /// Category the upload was classified as.
    pub kind: FileKind,
    /// Extracted text.
    pub text: String,
    /// Summary of the text.
    pub summary: String,
    /// Embedding of the text.
    pub embedding: Vec<f32>,
    /// Hex encoded SHA-256 of the uploaded bytes.
    pub sha256: String,
    /// Size of the uploaded file.
    pub size_bytes: u64,
    /// Upload time, RFC3339.
    pub uploaded_at: String,
    /// Insertion order; assigned by the store.
    pub sequence: u64,
}

/// Listing view of a record, without text and embedding.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    /// Identifier of the record.
    pub id: Uuid,
    /// Original filename.
    pub filename: String,
    /// Summary of the text.
    pub summary: String,
    /// Content type of the upload.
    pub file_type: String,
    /// Upload time, RFC3339.
    pub uploaded_at: String,
}

impl From<&DocumentRecord> for DocumentSummary {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename.clone(),
            summary: record.summary.clone(),
            file_type: record.file_type.clone(),
            uploaded_at: record.uploaded_at.clone(),
        }
    }
}

/// Process-lifetime document store.
#[derive(Default)]
pub struct DocumentStore {
    records: RwLock<HashMap<Uuid, Arc<DocumentRecord>>>,
    sequence: AtomicU64,
}

impl DocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record`, assigning its sequence number.
    pub async fn insert(&self, mut record: DocumentRecord) -> Result<Arc<DocumentRecord>, StoreError> {
        let mut guard = self.records.write().await;
        if guard.contains_key(&record.id) {
            return Err(StoreError::DuplicateId(record.id));
        }
        record.sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let record = Arc::new(record);
        guard.insert(record.id, Arc::clone(&record));
        tracing::debug!(id = %record.id, sequence = record.sequence, "Stored document");
        Ok(record)
    }

    /// Fetch a record by id.
    pub async fn get(&self, id: &Uuid) -> Option<Arc<DocumentRecord>> {
        self.records.read().await.get(id).cloned()
    }

    /// Every record, in upload order.
    pub async fn list(&self) -> Vec<Arc<DocumentRecord>> {
        let guard = self.records.read().await;
        let mut records: Vec<Arc<DocumentRecord>> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.sequence);
        records
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Hex encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Current time formatted as RFC3339.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str) -> DocumentRecord {
        DocumentRecord {
            id: Uuid::new_v4(),
            filename: filename.into(),
            file_type: "text/plain".into(),
            kind: FileKind::Text,
            text: "body".into(),
            summary: "body".into(),
            embedding: vec![0.0; 4],
            sha256: content_hash(b"body"),
            size_bytes: 4,
            uploaded_at: current_timestamp_rfc3339(),
            sequence: 0,
        }
    }

    #[tokio::test]
    async fn list_preserves_upload_order() {
        let store = DocumentStore::new();
        for name in ["a.txt", "b.txt", "c.txt"] {
            store.insert(record(name)).await.expect("insert");
        }

        let names: Vec<String> = store
            .list()
            .await
            .iter()
            .map(|record| record.filename.clone())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = DocumentStore::new();
        let first = record("a.txt");
        let mut second = record("b.txt");
        second.id = first.id;

        store.insert(first).await.expect("first insert");
        let error = store.insert(second).await.expect_err("duplicate");
        assert!(matches!(error, StoreError::DuplicateId(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn get_returns_stored_record() {
        let store = DocumentStore::new();
        let stored = store.insert(record("a.txt")).await.expect("insert");
        let fetched = store.get(&stored.id).await.expect("present");
        assert_eq!(fetched.filename, "a.txt");
        assert!(store.get(&Uuid::new_v4()).await.is_none());
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn timestamp_is_rfc3339_like() {
        let ts = current_timestamp_rfc3339();
        assert!(ts.contains('T') && ts.ends_with('Z'));
    }
}
