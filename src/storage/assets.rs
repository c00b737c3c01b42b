// SPDX-License-Identifier: MPL-2.0

//! Blob-backed assets
//!
//! Two flows share the blob store:
//! - Promotion: embedded `data:` rasters in frames and branding are uploaded
//!   and replaced by their URLs before the settings document is written.
//! - Session composites: uploaded once per session, deleted on retake.

use crate::backends::cloud::CloudServices;
use crate::config::{ConfigSnapshot, FirebaseConfig};
use crate::constants::cloud::PHOTO_PREFIX;
use crate::errors::SyncError;
use crate::pipelines::photo::raster::{decode_raster, is_embedded, parse_data_uri};
use crate::pipelines::photo::{EncodedImage, PhotoEncoder};
use tracing::{debug, info, warn};

/// Where a session composite lives in the blob store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudAssetRef {
    /// Retrieval URL (QR payload)
    pub url: String,
    pub storage_path: String,
}

/// Collision-resistant blob path for one session composite
pub fn session_photo_path(extension: &str) -> String {
    format!(
        "{}_{}_{}.{}",
        PHOTO_PREFIX,
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        uuid::Uuid::new_v4().simple(),
        extension
    )
}

/// Upload one embedded reference, returning its URL
async fn promote_one(
    cloud: &CloudServices,
    credentials: &FirebaseConfig,
    field: &str,
    reference: &str,
    path: String,
) -> Result<String, SyncError> {
    let fail = |reason: String| SyncError::PromotionFailed {
        field: field.to_string(),
        reason,
    };

    let payload = parse_data_uri(reference).map_err(|e| fail(e.to_string()))?;

    // Asset paths always end in .png
    let png = PhotoEncoder::png();
    let bytes = if payload.mime_type == png.format().mime_type() {
        payload.bytes
    } else {
        debug!(field, mime = %payload.mime_type, "Converting asset to PNG");
        let raster = decode_raster(payload.bytes)
            .await
            .map_err(|e| fail(e.to_string()))?;
        png.encode(raster).await.map_err(fail)?.data
    };

    let url = cloud
        .blobs
        .put_blob(credentials, bytes, &path, png.format().mime_type())
        .await
        .map_err(|e| fail(e.to_string()))?;

    info!(field, path = %path, "Embedded asset promoted");
    Ok(url)
}

/// Replace every embedded raster in `snapshot` with a blob URL
///
/// Either every embedded field is promoted or an error names the first
/// one that failed; a failed call leaves the caller's snapshot untouched.
pub async fn promote_assets(
    cloud: &CloudServices,
    credentials: &FirebaseConfig,
    snapshot: &ConfigSnapshot,
) -> Result<ConfigSnapshot, SyncError> {
    let mut promoted = snapshot.clone();

    // Frames are independent blobs; upload them together
    let frame_uploads = promoted.frames.iter_mut().filter(|f| is_embedded(&f.url)).map(
        |frame| async move {
            let field = format!("frames[{}].url", frame.id);
            let path = format!("assets/frames/{}.png", frame.id);
            frame.url = promote_one(cloud, credentials, &field, &frame.url, path).await?;
            Ok::<_, SyncError>(())
        },
    );
    futures::future::try_join_all(frame_uploads).await?;

    let millis = chrono::Utc::now().timestamp_millis();
    let theme = &mut promoted.theme;
    let branding = [
        (
            "theme.logoUrl",
            &mut theme.logo_url,
            "assets/branding/logo.png".to_string(),
        ),
        (
            "theme.loadingIconUrl",
            &mut theme.loading_icon_url,
            format!("assets/branding/loading_{}.png", millis),
        ),
        (
            "theme.backgroundImageUrl",
            &mut theme.background_image_url,
            format!("assets/branding/background_{}.png", millis),
        ),
    ];

    for (field, slot, path) in branding {
        if let Some(reference) = slot.as_deref()
            && is_embedded(reference)
        {
            let url = promote_one(cloud, credentials, field, reference, path).await?;
            *slot = Some(url);
        }
    }

    Ok(promoted)
}

/// Admin save: promote assets, then write the settings document
///
/// The document is never written while any field still embeds its payload.
pub async fn publish_snapshot(
    cloud: &CloudServices,
    credentials: &FirebaseConfig,
    snapshot: &ConfigSnapshot,
) -> Result<ConfigSnapshot, SyncError> {
    let promoted = promote_assets(cloud, credentials, snapshot).await?;
    let stored = cloud
        .documents
        .put_snapshot(credentials, &promoted)
        .await
        .map_err(|e| SyncError::ConfigSyncFailed(e.to_string()))?;

    info!(frames = stored.frames.len(), "Settings published");
    Ok(stored)
}

/// Upload a finished composite under a fresh session path
pub async fn upload_session_composite(
    cloud: &CloudServices,
    credentials: &FirebaseConfig,
    encoded: &EncodedImage,
) -> Result<CloudAssetRef, SyncError> {
    if !credentials.has_storage() {
        return Err(SyncError::UploadFailed("blob store not configured".into()));
    }

    let storage_path = session_photo_path(encoded.format.extension());
    debug!(path = %storage_path, size = encoded.data.len(), "Uploading composite");

    let url = cloud
        .blobs
        .put_blob(
            credentials,
            encoded.data.clone(),
            &storage_path,
            encoded.format.mime_type(),
        )
        .await
        .map_err(|e| SyncError::UploadFailed(e.to_string()))?;

    info!(path = %storage_path, "Composite uploaded");
    Ok(CloudAssetRef { url, storage_path })
}

/// Delete an uploaded composite by its stored URL
pub async fn delete_session_composite(
    cloud: &CloudServices,
    credentials: &FirebaseConfig,
    asset: &CloudAssetRef,
) -> Result<(), SyncError> {
    cloud
        .blobs
        .delete_blob(credentials, &asset.url)
        .await
        .map_err(|e| {
            warn!(url = %asset.url, error = %e, "Composite delete failed");
            SyncError::DeleteFailed(e.to_string())
        })
}
