// SPDX-License-Identifier: GPL-3.0-only

//! Device acquisition manager
//!
//! The manager provides:
//! - Device selection and the mirror policy that goes with it
//! - Exclusive ownership of the open stream
//! - Deterministic release when the session leaves a capture-eligible
//!   state or the preferred device changes
//!
//! Backend calls can block, so the async entry points run them on the
//! blocking pool.

use super::CameraBackend;
use super::types::*;
use crate::constants::geometry::RESOLUTION_HINT;
use crate::errors::DeviceError;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// An open stream and how its captures must be treated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredStream {
    pub device: CameraDevice,
    /// Flip captures horizontally to match the mirrored preview
    pub mirror: bool,
}

/// Internal manager state
struct ManagerState {
    /// The active backend instance
    backend: Box<dyn CameraBackend>,
    selection: DeviceSelection,
    resolution_hint: (u32, u32),
}

/// Device acquisition manager
///
/// Thread-safe and can be shared across threads.
#[derive(Clone)]
pub struct DeviceAcquisitionManager {
    state: Arc<Mutex<ManagerState>>,
}

impl DeviceAcquisitionManager {
    /// Create a manager around `backend`
    pub fn new(backend: Box<dyn CameraBackend>, preferred_device_id: Option<String>) -> Self {
        info!(backend = %backend.backend_type(), preferred = ?preferred_device_id, "Creating device acquisition manager");

        let state = ManagerState {
            backend,
            selection: DeviceSelection::resolve(preferred_device_id, Vec::new()),
            resolution_hint: RESOLUTION_HINT,
        };

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get the backend type
    pub fn backend_type(&self) -> CameraBackendType {
        self.lock().backend.backend_type()
    }

    /// Current selection without touching the hardware
    pub fn selection(&self) -> DeviceSelection {
        self.lock().selection.clone()
    }

    /// Re-enumerate devices
    ///
    /// An open stream whose device disappeared is released.
    pub fn refresh(&self) -> DeviceSelection {
        let mut state = self.lock();
        let devices = state.backend.enumerate_cameras();
        let preferred = state.selection.preferred_device_id.clone();
        state.selection = DeviceSelection::resolve(preferred, devices);

        let open_device = state.backend.current_device().map(|d| d.id.clone());
        if let Some(id) = open_device
            && !state.selection.available_devices.iter().any(|d| d.id == id)
        {
            warn!(device = %id, "Open device disappeared, releasing");
            Self::close_locked(&mut state);
        }

        info!(
            count = state.selection.available_devices.len(),
            mirror = state.selection.mirror_policy,
            "Device list refreshed"
        );
        state.selection.clone()
    }

    /// Change the preferred device; releases any open stream when it changes
    pub fn set_preferred_device(&self, preferred_device_id: Option<String>) {
        let mut state = self.lock();
        if state.selection.preferred_device_id == preferred_device_id {
            return;
        }

        info!(old = ?state.selection.preferred_device_id, new = ?preferred_device_id, "Preferred device changed");
        Self::close_locked(&mut state);
        let devices = std::mem::take(&mut state.selection.available_devices);
        state.selection = DeviceSelection::resolve(preferred_device_id, devices);
    }

    /// Open the selected device, or reuse the stream already open on it
    pub fn acquire_blocking(&self) -> Result<AcquiredStream, DeviceError> {
        let mut state = self.lock();

        if state.selection.available_devices.is_empty() {
            let devices = state.backend.enumerate_cameras();
            let preferred = state.selection.preferred_device_id.clone();
            state.selection = DeviceSelection::resolve(preferred, devices);
        }

        let device = state
            .selection
            .device()
            .cloned()
            .ok_or(DeviceError::NoCameraFound)?;
        let mirror = state.selection.mirror_policy;

        let already_open = state.backend.is_streaming()
            && state.backend.current_device().is_some_and(|d| d.id == device.id);
        if already_open {
            debug!(device = %device.id, "Reusing open stream");
            return Ok(AcquiredStream { device, mirror });
        }

        if state.selection.preferred_missing() {
            warn!(
                preferred = ?state.selection.preferred_device_id,
                fallback = %device.id,
                "Preferred device not connected, using default device"
            );
        }

        let request = StreamRequest {
            preferred_device_id: state.selection.preferred_device_id.clone(),
            mirror_hint: mirror,
            resolution_hint: state.resolution_hint,
        };

        state.backend.open(&device, &request).map_err(DeviceError::from)?;
        info!(device = %device.id, name = %device.name, mirror, "Device acquired");
        Ok(AcquiredStream { device, mirror })
    }

    /// Async wrapper for [`Self::acquire_blocking`]
    pub async fn acquire(&self) -> Result<AcquiredStream, DeviceError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.acquire_blocking())
            .await
            .map_err(|e| DeviceError::Unavailable(format!("acquire task failed: {}", e)))?
    }

    fn close_locked(state: &mut ManagerState) {
        if state.backend.is_streaming() || state.backend.current_device().is_some() {
            if let Err(e) = state.backend.close() {
                warn!(error = %e, "Error while releasing device");
            }
            info!("Device released");
        }
    }

    /// Release the stream; a no-op when nothing is open
    pub fn release_blocking(&self) {
        let mut state = self.lock();
        Self::close_locked(&mut state);
    }

    /// Async wrapper for [`Self::release_blocking`]
    pub async fn release(&self) {
        let this = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || this.release_blocking()).await {
            warn!(error = %e, "Release task failed");
        }
    }

    /// Check if a stream is open
    pub fn is_streaming(&self) -> bool {
        self.lock().backend.is_streaming()
    }

    /// Preview frames of the open stream
    pub fn preview(&self) -> Option<FrameReceiver> {
        self.lock().backend.preview_receiver()
    }

    /// Grab the latest frame of the open stream
    pub async fn capture(&self) -> Result<CameraFrame, DeviceError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.lock().backend.capture_frame())
            .await
            .map_err(|e| DeviceError::Unavailable(format!("capture task failed: {}", e)))?
            .map_err(DeviceError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts opens and closes
    struct CountingBackend {
        devices: Vec<CameraDevice>,
        open: Option<CameraDevice>,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl CameraBackend for CountingBackend {
        fn enumerate_cameras(&self) -> Vec<CameraDevice> {
            self.devices.clone()
        }
        fn open(&mut self, device: &CameraDevice, _request: &StreamRequest) -> BackendResult<()> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.open = Some(device.clone());
            Ok(())
        }
        fn close(&mut self) -> BackendResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.open = None;
            Ok(())
        }
        fn is_streaming(&self) -> bool {
            self.open.is_some()
        }
        fn capture_frame(&self) -> BackendResult<CameraFrame> {
            self.open
                .as_ref()
                .map(|_| CameraFrame::from_rgba(2, 2, vec![0; 16], 0))
                .ok_or(BackendError::NotStreaming)
        }
        fn preview_receiver(&self) -> Option<FrameReceiver> {
            None
        }
        fn current_device(&self) -> Option<&CameraDevice> {
            self.open.as_ref()
        }
        fn backend_type(&self) -> CameraBackendType {
            CameraBackendType::StillImage
        }
    }

    fn manager(
        devices: Vec<CameraDevice>,
        preferred: Option<&str>,
    ) -> (DeviceAcquisitionManager, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let opens = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            devices,
            open: None,
            opens: opens.clone(),
            closes: closes.clone(),
        };
        (
            DeviceAcquisitionManager::new(Box::new(backend), preferred.map(str::to_string)),
            opens,
            closes,
        )
    }

    fn device(id: &str) -> CameraDevice {
        CameraDevice {
            id: id.to_string(),
            name: id.to_string(),
            driver: None,
            location: CameraLocation::Unknown,
        }
    }

    #[test]
    fn test_acquire_without_devices_is_unavailable() {
        let (manager, _, _) = manager(Vec::new(), None);
        assert_eq!(manager.acquire_blocking(), Err(DeviceError::NoCameraFound));
    }

    #[test]
    fn test_acquire_reuses_open_stream() {
        let (manager, opens, _) = manager(vec![device("/dev/video0")], None);
        let first = manager.acquire_blocking().unwrap();
        assert!(first.mirror);
        manager.acquire_blocking().unwrap();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_changing_preferred_device_releases_stream() {
        let (manager, opens, closes) =
            manager(vec![device("/dev/video0"), device("/dev/video2")], None);
        manager.acquire_blocking().unwrap();

        manager.set_preferred_device(Some("/dev/video2".into()));
        assert!(!manager.is_streaming());
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        let stream = manager.acquire_blocking().unwrap();
        assert_eq!(stream.device.id, "/dev/video2");
        assert!(!stream.mirror);
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let (manager, _, closes) = manager(vec![device("/dev/video0")], None);
        manager.release_blocking();
        assert_eq!(closes.load(Ordering::SeqCst), 0);
        manager.acquire_blocking().unwrap();
        manager.release_blocking();
        manager.release_blocking();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_requires_stream() {
        let (manager, _, _) = manager(vec![device("/dev/video0")], None);
        assert_eq!(manager.capture().await.unwrap_err(), DeviceError::NotStreaming);
        manager.acquire().await.unwrap();
        let frame = manager.capture().await.unwrap();
        assert_eq!(frame.width, 2);
    }
}
