// SPDX-License-Identifier: MPL-2.0

//! Cloud document and blob stores
//!
//! ```text
//! ┌─────────────────────┐
//! │  Persistence Sync   │
//! └──────────┬──────────┘
//!            │
//!            ▼
//! ┌─────────────────────┐
//! │ DocumentStore trait │  settings/global: frames, theme, stats
//! │ BlobStore trait     │  session photos, promoted assets
//! └──────────┬──────────┘
//!            │
//!       ┌────┴─────┐
//!       ▼          ▼
//!  ┌────────┐ ┌────────┐
//!  │Firebase│ │ Memory │
//!  └────────┘ └────────┘
//! ```

pub mod firebase;
pub mod memory;

pub use firebase::FirebaseStore;
pub use memory::MemoryStore;

use crate::config::{AdminStats, ConfigSnapshot, FirebaseConfig, Frame};
use crate::constants;
use crate::errors::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Process-wide HTTP client (lazily initialized)
static HTTP_CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// Shared HTTP client for every cloud and remote call
///
/// Concurrent first use blocks on a single initialisation, so only one
/// client (and one connection pool) is ever built.
pub fn http_client() -> &'static reqwest::Client {
    HTTP_CLIENT.get_or_init(|| {
        debug!("Initializing HTTP client");
        reqwest::Client::builder()
            .timeout(constants::cloud::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

/// Cloud view of the settings document
///
/// Every field is optional: absent cloud fields must never erase local
/// values. The theme stays untyped so the merge can tell a missing key from
/// a defaulted one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloudSnapshot {
    pub frames: Option<Vec<Frame>>,
    pub theme: Option<Value>,
    pub stats: Option<AdminStats>,
    pub updated_at: Option<String>,
}

impl CloudSnapshot {
    /// Interpret a plain JSON settings document
    pub fn from_document(document: Value) -> Result<Self, StoreError> {
        let Value::Object(mut fields) = document else {
            return Err(StoreError::Decode("settings document is not an object".into()));
        };

        let present = |value: Option<Value>| value.filter(|v| !v.is_null());

        let frames = present(fields.remove("frames"))
            .map(serde_json::from_value::<Vec<Frame>>)
            .transpose()?;
        let theme = present(fields.remove("theme")).filter(Value::is_object);
        let stats = present(fields.remove("stats"))
            .map(serde_json::from_value::<AdminStats>)
            .transpose()?;
        let updated_at = present(fields.remove("updatedAt"))
            .and_then(|v| v.as_str().map(str::to_string));

        Ok(Self {
            frames,
            theme,
            stats,
            updated_at,
        })
    }
}

/// Build the settings document written by `put_snapshot`
pub fn snapshot_document(snapshot: &ConfigSnapshot) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(snapshot)?)
}

/// Structured settings storage with an atomic counter
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the settings document; `Ok(None)` when it does not exist
    async fn get_snapshot(
        &self,
        credentials: &FirebaseConfig,
    ) -> Result<Option<CloudSnapshot>, StoreError>;

    /// Overwrite the settings document wholesale, returning what was stored
    async fn put_snapshot(
        &self,
        credentials: &FirebaseConfig,
        snapshot: &ConfigSnapshot,
    ) -> Result<ConfigSnapshot, StoreError>;

    /// Atomically add one to the photo counter, creating it when absent
    async fn increment_counter(&self, credentials: &FirebaseConfig) -> Result<(), StoreError>;
}

/// Durable binary objects addressed by path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`, returning a retrieval URL
    async fn put_blob(
        &self,
        credentials: &FirebaseConfig,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError>;

    /// Delete by storage path or retrieval URL; already gone is success
    async fn delete_blob(
        &self,
        credentials: &FirebaseConfig,
        url_or_path: &str,
    ) -> Result<(), StoreError>;
}

/// The pair of stores a kiosk talks to
#[derive(Clone)]
pub struct CloudServices {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl CloudServices {
    pub fn new(documents: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self { documents, blobs }
    }

    /// Firestore + Firebase Storage over REST
    pub fn firebase() -> Self {
        let store = Arc::new(FirebaseStore::new());
        Self::new(store.clone(), store)
    }

    /// In-process stores (offline kiosks and tests)
    pub fn in_memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Self::new(store.clone(), store.clone()), store)
    }
}

impl std::fmt::Debug for CloudServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudServices").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_http_client_is_shared() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| http_client() as *const reqwest::Client as usize))
            .collect();
        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_partial_document_keeps_absent_fields_absent() {
        let snapshot = CloudSnapshot::from_document(json!({
            "theme": {"eventTitle": "Cloud"},
            "frames": null
        }))
        .unwrap();
        assert!(snapshot.frames.is_none());
        assert!(snapshot.stats.is_none());
        assert_eq!(snapshot.theme.unwrap()["eventTitle"], "Cloud");
    }

    #[test]
    fn test_full_document_is_parsed() {
        let snapshot = CloudSnapshot::from_document(json!({
            "frames": [{"id": "f1", "name": "One", "url": "https://x/f1.png"}],
            "stats": {"totalPhotos": 41},
            "updatedAt": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(snapshot.frames.unwrap()[0].id, "f1");
        assert_eq!(snapshot.stats.unwrap().total_photos, 41);
        assert!(snapshot.updated_at.is_some());
    }

    #[test]
    fn test_non_object_document_is_rejected() {
        assert!(CloudSnapshot::from_document(json!([1, 2])).is_err());
    }
}
