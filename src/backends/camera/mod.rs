// SPDX-License-Identifier: MPL-2.0

//! Camera backend abstraction
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │   Capture State Machine   │
//! └─────────────┬─────────────┘
//!               │
//!               ▼
//! ┌───────────────────────────┐
//! │ DeviceAcquisitionManager  │  ← Selection, mirroring, exclusive hold
//! └─────────────┬─────────────┘
//!               │
//!               ▼
//! ┌───────────────────────────┐
//! │    CameraBackend Trait    │  ← Common interface
//! └─────────────┬─────────────┘
//!               │
//!         ┌─────┴──────┐
//!         ▼            ▼
//!     ┌──────┐   ┌───────────┐
//!     │ V4L2 │   │Still image│
//!     └──────┘   └───────────┘
//! ```

pub mod file_source;
pub mod manager;
pub mod types;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use file_source::StillImageBackend;
pub use manager::{AcquiredStream, DeviceAcquisitionManager};
pub use types::*;

use std::path::PathBuf;

/// Camera backend trait
///
/// Calls may block (device open, waiting for a frame); async callers go
/// through [`DeviceAcquisitionManager`], which moves them onto the blocking
/// pool.
pub trait CameraBackend: Send + Sync {
    // ===== Enumeration =====

    /// Enumerate available cameras on this backend
    fn enumerate_cameras(&self) -> Vec<CameraDevice>;

    // ===== Lifecycle =====

    /// Open `device` and start streaming
    ///
    /// An already open stream is closed first.
    fn open(&mut self, device: &CameraDevice, request: &StreamRequest) -> BackendResult<()>;

    /// Stop streaming and release the device
    fn close(&mut self) -> BackendResult<()>;

    /// Check if a stream is open and producing frames
    fn is_streaming(&self) -> bool;

    // ===== Capture =====

    /// Copy of the most recent frame, waiting briefly for the first one
    fn capture_frame(&self) -> BackendResult<CameraFrame>;

    /// Receiver for preview frames while streaming
    fn preview_receiver(&self) -> Option<FrameReceiver>;

    // ===== Metadata =====

    /// Get the currently open camera device
    fn current_device(&self) -> Option<&CameraDevice>;

    /// Get the backend type identifier
    fn backend_type(&self) -> CameraBackendType;
}

/// Build the backend for a type
///
/// `still_image` is the file served by [`CameraBackendType::StillImage`].
pub fn get_backend(
    backend_type: CameraBackendType,
    still_image: Option<PathBuf>,
) -> BackendResult<Box<dyn CameraBackend>> {
    match (backend_type, still_image) {
        (CameraBackendType::StillImage, Some(path)) => Ok(Box::new(StillImageBackend::new(path))),
        (CameraBackendType::StillImage, None) => Err(BackendError::NotAvailable(
            "still image backend needs a file".into(),
        )),
        #[cfg(feature = "v4l2")]
        (CameraBackendType::V4l2, _) => Ok(Box::new(v4l2::V4l2Backend::new())),
        #[cfg(not(feature = "v4l2"))]
        (CameraBackendType::V4l2, _) => Err(BackendError::NotAvailable(
            "built without the v4l2 feature".into(),
        )),
    }
}

/// Get the default backend type
pub fn get_default_backend() -> CameraBackendType {
    CameraBackendType::V4l2
}
