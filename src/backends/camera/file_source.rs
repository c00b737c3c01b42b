// SPDX-License-Identifier: GPL-3.0-only

//! Still image camera
//!
//! Serves one image file as a camera device. Useful on machines without a
//! webcam and for rehearsing a kiosk setup: the preview shows the image and
//! every capture returns it.

use super::CameraBackend;
use super::types::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Device id prefix for still image cameras
pub const STILL_IMAGE_PREFIX: &str = "file:";

/// Load an image file as an RGBA frame
pub fn load_image_as_frame(path: &Path) -> BackendResult<CameraFrame> {
    info!(path = %path.display(), "Loading image file");

    let img = image::open(path).map_err(|e| {
        BackendError::DeviceNotFound(format!("Failed to load image '{}': {}", path.display(), e))
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    info!(width, height, "Image loaded successfully");
    Ok(CameraFrame::from_rgba(width, height, rgba.into_raw(), 0))
}

/// A still image presented as a camera
pub struct StillImageBackend {
    device: CameraDevice,
    path: PathBuf,
    sender: FrameSender,
    frame: Option<Arc<CameraFrame>>,
    opened: Option<CameraDevice>,
}

impl StillImageBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "still image".to_string());
        let (sender, _) = tokio::sync::watch::channel(None);

        Self {
            device: CameraDevice {
                id: format!("{}{}", STILL_IMAGE_PREFIX, path.display()),
                name,
                driver: None,
                location: CameraLocation::External,
            },
            path,
            sender,
            frame: None,
            opened: None,
        }
    }
}

impl CameraBackend for StillImageBackend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        if self.path.is_file() {
            vec![self.device.clone()]
        } else {
            Vec::new()
        }
    }

    fn open(&mut self, device: &CameraDevice, _request: &StreamRequest) -> BackendResult<()> {
        if device.id != self.device.id {
            return Err(BackendError::DeviceNotFound(device.id.clone()));
        }

        let frame = Arc::new(load_image_as_frame(&self.path)?);
        self.sender.send_replace(Some(frame.clone()));
        self.frame = Some(frame);
        self.opened = Some(device.clone());
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.frame = None;
        self.opened = None;
        self.sender.send_replace(None);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.frame.is_some()
    }

    fn capture_frame(&self) -> BackendResult<CameraFrame> {
        self.frame
            .as_ref()
            .map(|frame| frame.as_ref().clone())
            .ok_or(BackendError::NotStreaming)
    }

    fn preview_receiver(&self) -> Option<FrameReceiver> {
        self.frame.as_ref().map(|_| self.sender.subscribe())
    }

    fn current_device(&self) -> Option<&CameraDevice> {
        self.opened.as_ref()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::StillImage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn request() -> StreamRequest {
        StreamRequest {
            preferred_device_id: None,
            mirror_hint: false,
            resolution_hint: (1920, 1080),
        }
    }

    #[test]
    fn test_still_image_streams_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.png");
        RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let mut backend = StillImageBackend::new(&path);
        let devices = backend.enumerate_cameras();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].location, CameraLocation::External);

        backend.open(&devices[0], &request()).unwrap();
        assert!(backend.is_streaming());
        let frame = backend.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert!(backend.preview_receiver().unwrap().borrow().is_some());

        backend.close().unwrap();
        assert!(backend.capture_frame().is_err());
    }

    #[test]
    fn test_missing_file_has_no_devices() {
        let backend = StillImageBackend::new("/nonexistent/scene.png");
        assert!(backend.enumerate_cameras().is_empty());
    }
}
