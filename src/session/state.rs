// SPDX-License-Identifier: GPL-3.0-only

//! Session state types

use crate::errors::DeviceError;
use crate::pipelines::photo::FinishedComposite;
use crate::storage::CloudAssetRef;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

/// Lifecycle of one kiosk session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Live preview, waiting for a trigger
    #[default]
    Idle,
    /// Cosmetic 3-2-1 before the frame is grabbed
    CountingDown,
    /// Grabbing (or decoding an uploaded) frame
    Capturing,
    /// Waiting on the remote remix
    Remixing,
    /// Overlaying the frame and saving locally
    Compositing,
    /// Handing the composite to the blob store
    Uploading,
    /// Result on screen, auto-reset armed
    Ready,
    /// Cleaning up before the next session
    Retaking,
}

impl SessionState {
    /// States that need the capture device open
    pub fn is_capture_eligible(&self) -> bool {
        matches!(
            self,
            SessionState::Idle | SessionState::CountingDown | SessionState::Capturing
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::CountingDown => "counting-down",
            SessionState::Capturing => "capturing",
            SessionState::Remixing => "remixing",
            SessionState::Compositing => "compositing",
            SessionState::Uploading => "uploading",
            SessionState::Ready => "ready",
            SessionState::Retaking => "retaking",
        };
        write!(f, "{}", name)
    }
}

/// Identity of one session; results tagged with an older id are dropped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next(self) -> Self {
        SessionId(self.0 + 1)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the result screen encodes in its QR code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrPayload {
    /// Retrieval URL of the uploaded composite
    Cloud(String),
    /// Upload failed or is not configured; the composite only exists here
    LocalOnly(PathBuf),
}

impl QrPayload {
    pub fn text(&self) -> String {
        match self {
            QrPayload::Cloud(url) => url.clone(),
            QrPayload::LocalOnly(path) => format!("file://{}", path.display()),
        }
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self, QrPayload::Cloud(_))
    }
}

/// The single live session
#[derive(Debug, Default)]
pub struct CaptureSession {
    pub id: SessionId,
    pub state: SessionState,
    /// Capture already cropped to the kiosk ratio
    pub raw_capture: Option<Arc<RgbaImage>>,
    /// Remix output; absent when skipped or failed
    pub remixed_raster: Option<Arc<RgbaImage>>,
    final_composite: Option<FinishedComposite>,
    cloud_asset_ref: Option<CloudAssetRef>,
    /// Only set while `Ready`
    pub auto_reset_deadline: Option<Instant>,
}

impl CaptureSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn final_composite(&self) -> Option<&FinishedComposite> {
        self.final_composite.as_ref()
    }

    /// Store the composite; a second call is rejected
    pub fn set_final_composite(&mut self, composite: FinishedComposite) -> bool {
        if self.final_composite.is_some() {
            warn!(session = %self.id, "Composite already set, ignoring");
            return false;
        }
        self.final_composite = Some(composite);
        true
    }

    pub fn cloud_asset_ref(&self) -> Option<&CloudAssetRef> {
        self.cloud_asset_ref.as_ref()
    }

    /// Store the upload reference; a second call is rejected
    pub fn set_cloud_asset_ref(&mut self, asset: CloudAssetRef) -> bool {
        if self.cloud_asset_ref.is_some() {
            warn!(session = %self.id, "Asset reference already set, ignoring");
            return false;
        }
        self.cloud_asset_ref = Some(asset);
        true
    }

    /// Hand the upload reference to the retake cleanup
    pub fn take_cloud_asset_ref(&mut self) -> Option<CloudAssetRef> {
        self.cloud_asset_ref.take()
    }

    pub fn qr_payload(&self) -> Option<QrPayload> {
        if let Some(asset) = &self.cloud_asset_ref {
            return Some(QrPayload::Cloud(asset.url.clone()));
        }
        self.final_composite
            .as_ref()
            .map(|c| QrPayload::LocalOnly(c.local_path.clone()))
    }
}

/// Snapshot published to presentation layers
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub session: SessionId,
    pub state: SessionState,
    /// Countdown value while `CountingDown`
    pub countdown: Option<u32>,
    /// Seconds left before the automatic reset while `Ready`
    pub reset_remaining: Option<u64>,
    /// Set when the device could not be used; cleared by a refresh
    pub device_error: Option<DeviceError>,
    pub qr: Option<QrPayload>,
    pub composite: Option<Arc<RgbaImage>>,
    /// Whether the composite is built on a remixed raster
    pub remixed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::photo::{EncodedImage, EncodingFormat};

    fn composite(path: &str) -> FinishedComposite {
        FinishedComposite {
            raster: Arc::new(RgbaImage::new(4, 5)),
            encoded: EncodedImage {
                data: vec![0],
                format: EncodingFormat::Jpeg { quality: 100 },
                width: 4,
                height: 5,
            },
            local_path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_capture_eligible_states() {
        assert!(SessionState::Idle.is_capture_eligible());
        assert!(SessionState::Capturing.is_capture_eligible());
        assert!(!SessionState::Remixing.is_capture_eligible());
        assert!(!SessionState::Ready.is_capture_eligible());
    }

    #[test]
    fn test_composite_is_set_once() {
        let mut session = CaptureSession::new(SessionId(1));
        assert!(session.set_final_composite(composite("/a.jpg")));
        assert!(!session.set_final_composite(composite("/b.jpg")));
        assert_eq!(
            session.final_composite().unwrap().local_path,
            PathBuf::from("/a.jpg")
        );
    }

    #[test]
    fn test_qr_prefers_cloud_url() {
        let mut session = CaptureSession::new(SessionId(1));
        assert!(session.qr_payload().is_none());

        session.set_final_composite(composite("/data/photos/a.jpg"));
        assert_eq!(
            session.qr_payload(),
            Some(QrPayload::LocalOnly(PathBuf::from("/data/photos/a.jpg")))
        );

        session.set_cloud_asset_ref(CloudAssetRef {
            url: "https://cdn/a.jpg".into(),
            storage_path: "photos/a.jpg".into(),
        });
        assert!(session.qr_payload().unwrap().is_cloud());
        assert!(!session.set_cloud_asset_ref(CloudAssetRef {
            url: "https://cdn/b.jpg".into(),
            storage_path: "photos/b.jpg".into(),
        }));
    }

    #[test]
    fn test_local_payload_text_is_file_url() {
        let payload = QrPayload::LocalOnly(PathBuf::from("/tmp/a.jpg"));
        assert_eq!(payload.text(), "file:///tmp/a.jpg");
    }
}
