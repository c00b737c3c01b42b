// SPDX-License-Identifier: MPL-2.0

//! Firestore and Firebase Storage over REST
//!
//! The settings document lives at `settings/global`. Firestore stores typed
//! values (`stringValue`, `mapValue`, ...), so documents are converted to and
//! from plain JSON at this boundary.

use super::{BlobStore, CloudSnapshot, DocumentStore, http_client, snapshot_document};
use crate::config::{ConfigSnapshot, FirebaseConfig};
use crate::constants::cloud::{
    COUNTER_FIELD, FIRESTORE_BASE, SETTINGS_COLLECTION, SETTINGS_DOCUMENT, STORAGE_BASE,
};
use crate::errors::StoreError;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// REST client for Firestore and Firebase Storage
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    firestore_base: String,
    storage_base: String,
}

impl FirebaseStore {
    pub fn new() -> Self {
        Self::with_endpoints(FIRESTORE_BASE, STORAGE_BASE)
    }

    /// Point at different endpoints (emulators)
    pub fn with_endpoints(firestore_base: &str, storage_base: &str) -> Self {
        Self {
            firestore_base: firestore_base.trim_end_matches('/').to_string(),
            storage_base: storage_base.trim_end_matches('/').to_string(),
        }
    }

    fn document_name(credentials: &FirebaseConfig) -> String {
        format!(
            "projects/{}/databases/(default)/documents/{}/{}",
            credentials.project_id, SETTINGS_COLLECTION, SETTINGS_DOCUMENT
        )
    }

    fn document_url(&self, credentials: &FirebaseConfig) -> String {
        format!("{}/{}", self.firestore_base, Self::document_name(credentials))
    }

    fn commit_url(&self, credentials: &FirebaseConfig) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents:commit",
            self.firestore_base, credentials.project_id
        )
    }

    fn require_documents(credentials: &FirebaseConfig) -> Result<(), StoreError> {
        if credentials.is_usable() {
            Ok(())
        } else {
            Err(StoreError::NotConfigured(
                "apiKey and projectId are required".into(),
            ))
        }
    }

    fn require_storage(credentials: &FirebaseConfig) -> Result<(), StoreError> {
        if credentials.has_storage() {
            Ok(())
        } else {
            Err(StoreError::NotConfigured(
                "apiKey and storageBucket are required".into(),
            ))
        }
    }

    /// Object endpoint for a storage path
    fn object_url(&self, bucket: &str, path: &str) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.storage_base).map_err(|e| StoreError::Http(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Http("storage base cannot hold a path".into()))?
            .extend(["b", bucket, "o", path]);
        Ok(url)
    }

    /// Object endpoint behind either a download URL or a storage path
    fn delete_target(&self, bucket: &str, url_or_path: &str) -> Result<Url, StoreError> {
        if url_or_path.starts_with("http://") || url_or_path.starts_with("https://") {
            let mut url = Url::parse(url_or_path).map_err(|e| StoreError::Http(e.to_string()))?;
            url.set_query(None);
            Ok(url)
        } else {
            self.object_url(bucket, url_or_path)
        }
    }

    /// One Firestore commit with a single write
    async fn commit(&self, credentials: &FirebaseConfig, write: Value) -> Result<(), StoreError> {
        let response = http_client()
            .post(self.commit_url(credentials))
            .query(&[("key", credentials.api_key.as_str())])
            .json(&json!({ "writes": [write] }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::NotFound(Self::document_name(credentials))),
            StatusCode::CONFLICT => {
                Err(StoreError::AlreadyExists(Self::document_name(credentials)))
            }
            status => Err(StoreError::Http(format!(
                "commit returned {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

/// The two Firestore writes the counter is built from
#[async_trait]
trait CounterWrites: Send + Sync {
    /// Increment an existing counter; `NotFound` when the document is absent
    async fn try_increment(&self, credentials: &FirebaseConfig) -> Result<(), StoreError>;

    /// Create the document with the counter at 1; `AlreadyExists` if present
    async fn create_counter(&self, credentials: &FirebaseConfig) -> Result<(), StoreError>;
}

/// Increment, creating the counter when the document does not exist yet
///
/// Losing the create race to another kiosk retries the increment once.
async fn increment_or_create<W: CounterWrites + ?Sized>(
    writes: &W,
    credentials: &FirebaseConfig,
) -> Result<(), StoreError> {
    match writes.try_increment(credentials).await {
        Err(StoreError::NotFound(_)) => {}
        other => return other,
    }

    debug!("Counter document missing, creating it");
    match writes.create_counter(credentials).await {
        Err(StoreError::AlreadyExists(_)) => {
            warn!("Counter created concurrently, retrying increment");
            writes.try_increment(credentials).await
        }
        other => other,
    }
}

#[async_trait]
impl CounterWrites for FirebaseStore {
    async fn try_increment(&self, credentials: &FirebaseConfig) -> Result<(), StoreError> {
        self.commit(
            credentials,
            json!({
                "transform": {
                    "document": Self::document_name(credentials),
                    "fieldTransforms": [{
                        "fieldPath": COUNTER_FIELD,
                        "increment": { "integerValue": "1" }
                    }]
                },
                "currentDocument": { "exists": true }
            }),
        )
        .await
    }

    async fn create_counter(&self, credentials: &FirebaseConfig) -> Result<(), StoreError> {
        self.commit(
            credentials,
            json!({
                "update": {
                    "name": Self::document_name(credentials),
                    "fields": encode_fields(&json!({ "stats": { "totalPhotos": 1 } })),
                },
                "currentDocument": { "exists": false }
            }),
        )
        .await
    }
}

impl Default for FirebaseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for FirebaseStore {
    async fn get_snapshot(
        &self,
        credentials: &FirebaseConfig,
    ) -> Result<Option<CloudSnapshot>, StoreError> {
        Self::require_documents(credentials)?;

        let response = http_client()
            .get(self.document_url(credentials))
            .query(&[("key", credentials.api_key.as_str())])
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!("Settings document does not exist");
                Ok(None)
            }
            status if status.is_success() => {
                let body: Value = response.json().await?;
                let fields = body.get("fields").cloned().unwrap_or_else(|| json!({}));
                CloudSnapshot::from_document(decode_fields(&fields)).map(Some)
            }
            status => Err(StoreError::Http(format!("get returned {}", status))),
        }
    }

    async fn put_snapshot(
        &self,
        credentials: &FirebaseConfig,
        snapshot: &ConfigSnapshot,
    ) -> Result<ConfigSnapshot, StoreError> {
        Self::require_documents(credentials)?;

        let mut stored = snapshot.clone();
        stored.updated_at = Some(chrono::Utc::now().to_rfc3339());
        let document = snapshot_document(&stored)?;

        // PATCH without an update mask replaces the whole document
        let response = http_client()
            .patch(self.document_url(credentials))
            .query(&[("key", credentials.api_key.as_str())])
            .json(&json!({ "fields": encode_fields(&document) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Http(format!(
                "put returned {}",
                response.status()
            )));
        }

        info!(frames = stored.frames.len(), "Settings document saved");
        Ok(stored)
    }

    async fn increment_counter(&self, credentials: &FirebaseConfig) -> Result<(), StoreError> {
        Self::require_documents(credentials)?;
        increment_or_create(self, credentials).await
    }
}

#[async_trait]
impl BlobStore for FirebaseStore {
    async fn put_blob(
        &self,
        credentials: &FirebaseConfig,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        Self::require_storage(credentials)?;
        let bucket = &credentials.storage_bucket;

        let mut upload_url = Url::parse(&self.storage_base).map_err(|e| StoreError::Http(e.to_string()))?;
        upload_url
            .path_segments_mut()
            .map_err(|_| StoreError::Http("storage base cannot hold a path".into()))?
            .extend(["b", bucket.as_str(), "o"]);

        let size = bytes.len();
        let response = http_client()
            .post(upload_url)
            .query(&[("name", path)])
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Http(format!(
                "upload returned {}",
                response.status()
            )));
        }

        let metadata: Value = response.json().await?;
        let mut download = self.object_url(bucket, path)?;
        {
            let mut query = download.query_pairs_mut();
            query.append_pair("alt", "media");
            if let Some(token) = metadata
                .get("downloadTokens")
                .and_then(Value::as_str)
                .and_then(|tokens| tokens.split(',').next())
            {
                query.append_pair("token", token);
            }
        }

        info!(path, size, "Blob uploaded");
        Ok(download.to_string())
    }

    async fn delete_blob(
        &self,
        credentials: &FirebaseConfig,
        url_or_path: &str,
    ) -> Result<(), StoreError> {
        Self::require_storage(credentials)?;
        let target = self.delete_target(&credentials.storage_bucket, url_or_path)?;

        let response = http_client().delete(target).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(reference = url_or_path, "Blob already gone");
                Ok(())
            }
            status if status.is_success() => {
                info!(reference = url_or_path, "Blob deleted");
                Ok(())
            }
            status => Err(StoreError::Http(format!("delete returned {}", status))),
        }
    }
}

/// Plain JSON object to Firestore `fields`
pub fn encode_fields(document: &Value) -> Value {
    match document {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), encode_value(value)))
                .collect(),
        ),
        _ => json!({}),
    }
}

/// Firestore `fields` to a plain JSON object
pub fn decode_fields(fields: &Value) -> Value {
    match fields {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), decode_value(value)))
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(_) => json!({ "mapValue": { "fields": encode_fields(value) } }),
    }
}

fn decode_value(value: &Value) -> Value {
    let Value::Object(typed) = value else {
        return Value::Null;
    };
    let Some((kind, inner)) = typed.iter().next() else {
        return Value::Null;
    };

    match kind.as_str() {
        "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
        "booleanValue" | "doubleValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => decode_fields(inner.get("fields").unwrap_or(&Value::Null)),
        _ => Value::Null,
    }
}
