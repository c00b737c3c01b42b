// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera backend abstraction

//! Shared types for camera backends

use crate::errors::DeviceError;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Instant;

/// Camera backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraBackendType {
    /// Direct V4L2 capture (Linux)
    #[default]
    V4l2,
    /// A still image served as a camera
    StillImage,
}

impl std::fmt::Display for CameraBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraBackendType::V4l2 => write!(f, "V4L2"),
            CameraBackendType::StillImage => write!(f, "still image"),
        }
    }
}

/// Where the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraLocation {
    /// Faces the user (a kiosk webcam)
    Front,
    /// Faces away from the user
    Back,
    /// Separately attached device (document camera, DSLR bridge)
    External,
    #[default]
    Unknown,
}

impl CameraLocation {
    /// Parse a location property ("front", "back", "external")
    pub fn from_property(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "front" | "user" => CameraLocation::Front,
            "back" | "environment" => CameraLocation::Back,
            "external" => CameraLocation::External,
            _ => CameraLocation::Unknown,
        }
    }
}

impl std::fmt::Display for CameraLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraLocation::Front => write!(f, "front"),
            CameraLocation::Back => write!(f, "back"),
            CameraLocation::External => write!(f, "external"),
            CameraLocation::Unknown => write!(f, "unknown"),
        }
    }
}

/// Represents a camera device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    /// Stable identifier (device path for V4L2)
    pub id: String,
    /// Human readable name (V4L2 card)
    pub name: String,
    /// Driver name, when known
    pub driver: Option<String>,
    pub location: CameraLocation,
}

/// What the state machine asks of the device collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub preferred_device_id: Option<String>,
    /// The preview is shown mirrored
    pub mirror_hint: bool,
    /// Largest resolution worth negotiating
    pub resolution_hint: (u32, u32),
}

/// Device choice for the next session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    pub preferred_device_id: Option<String>,
    pub available_devices: Vec<CameraDevice>,
    /// True only for a default front-facing device
    pub mirror_policy: bool,
}

impl DeviceSelection {
    /// Resolve the device to open and whether captures are mirrored
    ///
    /// A connected preferred device wins. Otherwise the first front-facing
    /// device, or the first device at all, is used. Mirroring never applies
    /// while a preferred device is configured, even one that is unplugged.
    pub fn resolve(preferred_device_id: Option<String>, available: Vec<CameraDevice>) -> Self {
        let chosen = Self::choose(preferred_device_id.as_deref(), &available);
        let mirror_policy = preferred_device_id.is_none()
            && chosen.is_some_and(|device| device.location != CameraLocation::Back);

        Self {
            preferred_device_id,
            available_devices: available,
            mirror_policy,
        }
    }

    fn choose<'a>(preferred: Option<&str>, available: &'a [CameraDevice]) -> Option<&'a CameraDevice> {
        preferred
            .and_then(|id| available.iter().find(|d| d.id == id))
            .or_else(|| {
                available
                    .iter()
                    .find(|d| d.location == CameraLocation::Front)
            })
            .or_else(|| available.first())
    }

    /// The device a session would open now
    pub fn device(&self) -> Option<&CameraDevice> {
        Self::choose(self.preferred_device_id.as_deref(), &self.available_devices)
    }

    /// True when a configured preferred device is not connected
    pub fn preferred_missing(&self) -> bool {
        self.preferred_device_id
            .as_deref()
            .is_some_and(|id| !self.available_devices.iter().any(|d| d.id == id))
    }
}

/// A single RGBA frame from the camera
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA pixels
    pub data: Arc<[u8]>,
    /// Frame counter since the stream opened
    pub sequence: u64,
    /// Timestamp when frame was captured
    pub captured_at: Instant,
}

impl CameraFrame {
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, sequence: u64) -> Self {
        Self {
            width,
            height,
            data: Arc::from(data.into_boxed_slice()),
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Copy into an owned raster; `None` if the buffer is short
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }
}

/// Latest-frame receiver for previews
pub type FrameReceiver = tokio::sync::watch::Receiver<Option<Arc<CameraFrame>>>;

/// Latest-frame sender owned by a backend
pub type FrameSender = tokio::sync::watch::Sender<Option<Arc<CameraFrame>>>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Backend is not available on this system
    NotAvailable(String),
    /// Opening the device was refused
    PermissionDenied(String),
    /// Camera device not found
    DeviceNotFound(String),
    /// Failed to start streaming
    InitializationFailed(String),
    /// Capture requested without an open stream
    NotStreaming,
    /// No frame arrived in time
    Timeout,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            BackendError::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            BackendError::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            BackendError::NotStreaming => write!(f, "No active stream"),
            BackendError::Timeout => write!(f, "Timed out waiting for a frame"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for DeviceError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied(msg) => DeviceError::PermissionDenied(msg),
            BackendError::DeviceNotFound(_) => DeviceError::NoCameraFound,
            BackendError::NotStreaming => DeviceError::NotStreaming,
            BackendError::Timeout => DeviceError::NoFrame,
            other => DeviceError::Unavailable(other.to_string()),
        }
    }
}
