// SPDX-License-Identifier: MPL-2.0

//! Error types for the kiosk
//!
//! Every failure the capture pipeline can meet has a classification here.
//! Only [`DeviceError`] stops a capture; the others are recovered by the
//! component that meets them and surface as log lines and degraded results.

use thiserror::Error;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Capture device errors
    #[error("Camera error: {0}")]
    Device(#[from] DeviceError),
    /// Remote remix errors
    #[error("Remix error: {0}")]
    Remix(#[from] RemixError),
    /// Document/blob store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    /// Persistence sync errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    /// Raster decode errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Capture device errors, all classified as `DeviceUnavailable`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// No capture devices found
    #[error("No camera devices found")]
    NoCameraFound,
    /// Permission to open the device was denied
    #[error("Permission denied for {0}")]
    PermissionDenied(String),
    /// The device exists but could not be opened or streamed
    #[error("Device unavailable: {0}")]
    Unavailable(String),
    /// A frame was requested while no stream is open
    #[error("No active stream")]
    NotStreaming,
    /// The stream produced no usable frame
    #[error("No frame available for capture")]
    NoFrame,
}

/// Remote remix errors
///
/// The client collapses all of these into a single recoverable
/// `RemixUnavailable` outcome; the variants only exist for logging.
#[derive(Debug, Clone, Error)]
pub enum RemixError {
    /// No API key configured
    #[error("Remix service not configured")]
    NotConfigured,
    /// Transport or HTTP status failure
    #[error("Remix request failed: {0}")]
    Request(String),
    /// Response contained no candidates
    #[error("Remix response was empty")]
    EmptyResponse,
    /// Response contained no inline image part
    #[error("Remix response contained no image")]
    NoImage,
    /// Submitted or returned raster could not be processed
    #[error("Remix raster invalid: {0}")]
    InvalidRaster(String),
}

/// Document and blob store errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Credentials lack the fields the operation needs
    #[error("Cloud store not configured: {0}")]
    NotConfigured(String),
    /// Addressed document or object does not exist
    #[error("Not found: {0}")]
    NotFound(String),
    /// Create-only write hit an existing document
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// Transport or unexpected status
    #[error("HTTP error: {0}")]
    Http(String),
    /// Payload could not be (de)serialised
    #[error("Malformed payload: {0}")]
    Decode(String),
}

/// Persistence sync errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// Cloud configuration fetch failed; local snapshot stays authoritative
    #[error("Config sync failed: {0}")]
    ConfigSyncFailed(String),
    /// Session composite upload failed; session completes locally
    #[error("Upload failed: {0}")]
    UploadFailed(String),
    /// Blob delete on retake failed; reset proceeds
    #[error("Delete failed: {0}")]
    DeleteFailed(String),
    /// An embedded asset could not be promoted; nothing was persisted
    #[error("Asset promotion failed for {field}: {reason}")]
    PromotionFailed { field: String, reason: String },
    /// Local durable store could not be written
    #[error("Local store write failed: {0}")]
    LocalWrite(String),
}

/// Raster decode errors from decode-to-completion loading
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Source could not be fetched or read
    #[error("Failed to load {source_ref}: {reason}")]
    Load { source_ref: String, reason: String },
    /// Bytes were not a decodable raster
    #[error("Failed to decode raster: {0}")]
    Format(String),
    /// Data URI was malformed
    #[error("Invalid data URI")]
    InvalidDataUri,
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        DecodeError::Format(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err.to_string())
    }
}

impl From<reqwest::Error> for RemixError {
    fn from(err: reqwest::Error) -> Self {
        RemixError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_wraps_into_app_error() {
        let err: AppError = DeviceError::NoCameraFound.into();
        assert_eq!(err.to_string(), "Camera error: No camera devices found");
    }

    #[test]
    fn test_promotion_failure_names_field() {
        let err = SyncError::PromotionFailed {
            field: "theme.logoUrl".into(),
            reason: "HTTP error: 500".into(),
        };
        assert!(err.to_string().contains("theme.logoUrl"));
    }
}
