// SPDX-License-Identifier: MPL-2.0

//! In-process document and blob store
//!
//! Same contract as the Firebase stores: a missing document reads as `None`,
//! the counter is created on first increment, and deleting a missing blob
//! succeeds. Every delete request is recorded so callers can audit them.

use super::{BlobStore, CloudSnapshot, DocumentStore, snapshot_document};
use crate::config::{ConfigSnapshot, FirebaseConfig};
use crate::errors::StoreError;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

const URL_SCHEME: &str = "memory://";

#[derive(Debug, Default)]
struct MemoryState {
    document: Option<Value>,
    blobs: HashMap<String, Vec<u8>>,
    delete_requests: Vec<String>,
}

/// Document and blob store held in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the settings document
    pub fn with_document(document: Value) -> Self {
        let store = Self::new();
        store.lock().document = Some(document);
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current settings document
    pub fn document(&self) -> Option<Value> {
        self.lock().document.clone()
    }

    /// Stored counter value, if the document has one
    pub fn counter(&self) -> Option<u64> {
        self.lock()
            .document
            .as_ref()
            .and_then(|doc| doc.pointer("/stats/totalPhotos"))
            .and_then(Value::as_u64)
    }

    /// Stored bytes at `path`
    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().blobs.get(path).cloned()
    }

    pub fn blob_count(&self) -> usize {
        self.lock().blobs.len()
    }

    /// Every reference passed to `delete_blob`, in order
    pub fn delete_requests(&self) -> Vec<String> {
        self.lock().delete_requests.clone()
    }

    fn path_of(url_or_path: &str) -> &str {
        url_or_path.strip_prefix(URL_SCHEME).unwrap_or(url_or_path)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_snapshot(
        &self,
        _credentials: &FirebaseConfig,
    ) -> Result<Option<CloudSnapshot>, StoreError> {
        self.document().map(CloudSnapshot::from_document).transpose()
    }

    async fn put_snapshot(
        &self,
        _credentials: &FirebaseConfig,
        snapshot: &ConfigSnapshot,
    ) -> Result<ConfigSnapshot, StoreError> {
        let mut stored = snapshot.clone();
        stored.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let document = snapshot_document(&stored)?;
        self.lock().document = Some(document);
        Ok(stored)
    }

    async fn increment_counter(&self, _credentials: &FirebaseConfig) -> Result<(), StoreError> {
        let mut state = self.lock();
        let document = state
            .document
            .get_or_insert_with(|| json!({ "stats": { "totalPhotos": 0 } }));

        let Value::Object(fields) = document else {
            return Err(StoreError::Decode("settings document is not an object".into()));
        };
        let stats = fields.entry("stats").or_insert_with(|| json!({}));
        let Value::Object(stats) = stats else {
            return Err(StoreError::Decode("stats is not an object".into()));
        };
        let current = stats.get("totalPhotos").and_then(Value::as_u64).unwrap_or(0);
        stats.insert("totalPhotos".into(), json!(current + 1));

        debug!(total = current + 1, "Counter incremented");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn put_blob(
        &self,
        _credentials: &FirebaseConfig,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        debug!(path, content_type, size = bytes.len(), "Storing blob");
        self.lock().blobs.insert(path.to_string(), bytes);
        Ok(format!("{}{}", URL_SCHEME, path))
    }

    async fn delete_blob(
        &self,
        _credentials: &FirebaseConfig,
        url_or_path: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.delete_requests.push(url_or_path.to_string());
        if state.blobs.remove(Self::path_of(url_or_path)).is_none() {
            debug!(reference = url_or_path, "Blob already gone");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> FirebaseConfig {
        FirebaseConfig::default()
    }

    #[tokio::test]
    async fn test_missing_document_reads_as_none() {
        let store = MemoryStore::new();
        assert!(store.get_snapshot(&creds()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_creates_counter() {
        let store = MemoryStore::new();
        store.increment_counter(&creds()).await.unwrap();
        assert_eq!(store.counter(), Some(1));
    }

    #[tokio::test]
    async fn test_increment_keeps_other_fields() {
        let store = MemoryStore::with_document(json!({
            "frames": [],
            "stats": { "totalPhotos": 9 }
        }));
        store.increment_counter(&creds()).await.unwrap();
        assert_eq!(store.counter(), Some(10));
        assert!(store.document().unwrap().get("frames").is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryStore::new();
        let url = store
            .put_blob(&creds(), vec![1, 2, 3], "photos/a.jpg", "image/jpeg")
            .await
            .unwrap();
        assert_eq!(store.blob("photos/a.jpg"), Some(vec![1, 2, 3]));
        store.delete_blob(&creds(), &url).await.unwrap();
        store.delete_blob(&creds(), "photos/a.jpg").await.unwrap();
        assert_eq!(store.blob_count(), 0);
        assert_eq!(store.delete_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_put_snapshot_stamps_update_time() {
        let store = MemoryStore::new();
        let stored = store
            .put_snapshot(&creds(), &ConfigSnapshot::default())
            .await
            .unwrap();
        assert!(stored.updated_at.is_some());
        let read = store.get_snapshot(&creds()).await.unwrap().unwrap();
        assert_eq!(read.updated_at, stored.updated_at);
    }
}
