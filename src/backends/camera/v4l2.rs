// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture
//!
//! The device is opened and streamed on a dedicated thread. Frames are
//! decoded to RGBA and published on a latest-value channel; nothing queues,
//! so a slow consumer only ever sees the newest frame. Closing the stream
//! joins the thread, which drops the device handle before returning.

use super::types::*;
use super::CameraBackend;
use crate::constants::device::{FIRST_FRAME_TIMEOUT, STREAM_BUFFERS, WARMUP_FRAMES};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// How long a blocked dequeue may wait before the running flag is rechecked
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Pixel formats we can decode, in order of preference
const PREFERRED_FOURCCS: [&[u8; 4]; 2] = [b"MJPG", b"YUYV"];

/// A running capture thread
struct V4l2Stream {
    running: Arc<AtomicBool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    receiver: FrameReceiver,
}

impl V4l2Stream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            match handle.join() {
                Ok(_) => info!("Capture thread stopped"),
                Err(_) => warn!("Capture thread panicked"),
            }
        }
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// V4L2 camera backend
#[derive(Default)]
pub struct V4l2Backend {
    stream: Option<V4l2Stream>,
    device: Option<CameraDevice>,
}

impl V4l2Backend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CameraBackend for V4l2Backend {
    fn enumerate_cameras(&self) -> Vec<CameraDevice> {
        let mut cameras: Vec<CameraDevice> = v4l::context::enum_devices()
            .into_iter()
            .filter_map(|node| {
                let path = node.path().to_string_lossy().to_string();
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                if !caps
                    .capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                {
                    return None;
                }
                // Metadata nodes report capture capability but list no formats
                if dev.enum_formats().map(|f| f.is_empty()).unwrap_or(true) {
                    debug!(path, "Skipping node without capture formats");
                    return None;
                }

                Some(CameraDevice {
                    id: path,
                    name: node.name().unwrap_or(caps.card),
                    driver: Some(caps.driver),
                    location: CameraLocation::Unknown,
                })
            })
            .collect();

        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(count = cameras.len(), "Enumerated V4L2 cameras");
        cameras
    }

    fn open(&mut self, device: &CameraDevice, request: &StreamRequest) -> BackendResult<()> {
        if self.stream.is_some() {
            self.close()?;
        }

        info!(
            device = %device.id,
            name = %device.name,
            hint_width = request.resolution_hint.0,
            hint_height = request.resolution_hint.1,
            "Opening V4L2 stream"
        );

        let (sender, receiver) = tokio::sync::watch::channel(None);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<BackendResult<()>>();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let device_path = device.id.clone();
        let hint = request.resolution_hint;

        let thread_handle = std::thread::Builder::new()
            .name("v4l2-capture".into())
            .spawn(move || {
                if let Err(e) = capture_loop(&device_path, hint, sender, running_clone, ready_tx) {
                    error!(error = %e, "Capture loop failed");
                }
            })
            .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

        let mut stream = V4l2Stream {
            running,
            thread_handle: Some(thread_handle),
            receiver,
        };

        match ready_rx.recv_timeout(FIRST_FRAME_TIMEOUT) {
            Ok(Ok(())) => {
                self.stream = Some(stream);
                self.device = Some(device.clone());
                Ok(())
            }
            Ok(Err(e)) => {
                stream.stop();
                Err(e)
            }
            Err(_) => {
                stream.stop();
                Err(BackendError::InitializationFailed(
                    "device did not start streaming".into(),
                ))
            }
        }
    }

    fn close(&mut self) -> BackendResult<()> {
        if let Some(mut stream) = self.stream.take() {
            info!(device = ?self.device.as_ref().map(|d| &d.id), "Releasing V4L2 stream");
            stream.stop();
        }
        self.device = None;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::SeqCst))
    }

    fn capture_frame(&self) -> BackendResult<CameraFrame> {
        let stream = self.stream.as_ref().ok_or(BackendError::NotStreaming)?;
        let deadline = Instant::now() + FIRST_FRAME_TIMEOUT;

        loop {
            let latest = stream.receiver.borrow().clone();
            // Skip the first frames while exposure settles
            if let Some(frame) = &latest
                && frame.sequence >= WARMUP_FRAMES as u64
            {
                return Ok(frame.as_ref().clone());
            }
            if !stream.running.load(Ordering::SeqCst) {
                return Err(BackendError::Other("capture thread stopped".into()));
            }
            if Instant::now() >= deadline {
                return latest
                    .map(|frame| frame.as_ref().clone())
                    .ok_or(BackendError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn preview_receiver(&self) -> Option<FrameReceiver> {
        self.stream.as_ref().map(|s| s.receiver.clone())
    }

    fn current_device(&self) -> Option<&CameraDevice> {
        self.device.as_ref()
    }

    fn backend_type(&self) -> CameraBackendType {
        CameraBackendType::V4l2
    }
}

impl Drop for V4l2Backend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn open_error(device_path: &str, e: std::io::Error) -> BackendError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(device_path.into()),
        std::io::ErrorKind::NotFound => BackendError::DeviceNotFound(device_path.into()),
        _ => BackendError::InitializationFailed(format!("{}: {}", device_path, e)),
    }
}

/// Main capture loop running in a separate thread
fn capture_loop(
    device_path: &str,
    resolution_hint: (u32, u32),
    sender: FrameSender,
    running: Arc<AtomicBool>,
    ready: std::sync::mpsc::Sender<BackendResult<()>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut dev = match Device::with_path(device_path) {
        Ok(dev) => dev,
        Err(e) => {
            let err = open_error(device_path, e);
            let _ = ready.send(Err(err.clone()));
            return Err(err.into());
        }
    };

    let format = match negotiate_format(&mut dev, resolution_hint) {
        Ok(format) => format,
        Err(e) => {
            let _ = ready.send(Err(e.clone()));
            return Err(e.into());
        }
    };

    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, STREAM_BUFFERS) {
        Ok(stream) => stream,
        Err(e) => {
            let err = open_error(device_path, e);
            let _ = ready.send(Err(err.clone()));
            return Err(err.into());
        }
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    let _ = ready.send(Ok(()));
    info!(
        device_path,
        width = format.width,
        height = format.height,
        fourcc = %format.fourcc,
        "V4L2 capture stream started"
    );

    let mut sequence: u64 = 0;
    while running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, _meta)) => match decode_frame(buf, &format, sequence) {
                Some(frame) => {
                    sender.send_replace(Some(Arc::new(frame)));
                    if sequence % 120 == 0 {
                        debug!(sequence, size = buf.len(), "Frame captured");
                    }
                    sequence += 1;
                }
                None => {
                    if sequence % 30 == 0 {
                        debug!(size = buf.len(), "Dropped undecodable frame");
                    }
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                warn!(error = %e, "Failed to capture frame");
                if e.kind() == std::io::ErrorKind::NotFound
                    || e.raw_os_error() == Some(19)
                {
                    // ENODEV: unplugged
                    break;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    info!(device_path, "V4L2 capture loop ended");
    Ok(())
}

/// Pick the best decodable format at the hinted resolution
fn negotiate_format(dev: &mut Device, hint: (u32, u32)) -> BackendResult<v4l::Format> {
    let supported: Vec<v4l::FourCC> = dev
        .enum_formats()
        .map_err(|e| BackendError::InitializationFailed(e.to_string()))?
        .into_iter()
        .map(|desc| desc.fourcc)
        .collect();

    let fourcc = PREFERRED_FOURCCS
        .iter()
        .map(|code| v4l::FourCC::new(code))
        .find(|fourcc| supported.contains(fourcc))
        .ok_or_else(|| {
            BackendError::InitializationFailed(format!(
                "no supported pixel format in {:?}",
                supported
            ))
        })?;

    // The driver clamps to the nearest size it supports
    let requested = v4l::Format::new(hint.0, hint.1, fourcc);
    let actual = dev
        .set_format(&requested)
        .map_err(|e| BackendError::InitializationFailed(e.to_string()))?;

    if actual.fourcc != fourcc {
        return Err(BackendError::InitializationFailed(format!(
            "driver switched format to {}",
            actual.fourcc
        )));
    }

    Ok(actual)
}

fn decode_frame(buf: &[u8], format: &v4l::Format, sequence: u64) -> Option<CameraFrame> {
    if format.fourcc == v4l::FourCC::new(b"MJPG") {
        let rgba = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
            .ok()?
            .to_rgba8();
        return Some(CameraFrame::from_rgba(
            rgba.width(),
            rgba.height(),
            rgba.into_raw(),
            sequence,
        ));
    }

    let (width, height) = (format.width, format.height);
    if buf.len() < (width * height * 2) as usize {
        return None;
    }
    Some(CameraFrame::from_rgba(
        width,
        height,
        yuyv_to_rgba(buf, width, height),
        sequence,
    ))
}

/// Convert YUYV (YUV 4:2:2) to RGBA
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients for YUV to RGB conversion.
pub fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgba = Vec::with_capacity(pixel_count * 4);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
            let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
            let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
            rgba.extend_from_slice(&[r, g, b, 255]);
        }

        if rgba.len() >= pixel_count * 4 {
            break;
        }
    }

    rgba
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_grey_converts_to_grey() {
        let data = [128u8, 128, 128, 128];
        let rgba = yuyv_to_rgba(&data, 2, 1);
        assert_eq!(rgba, vec![128, 128, 128, 255, 128, 128, 128, 255]);
    }

    #[test]
    fn test_yuyv_output_is_bounded_by_frame_size() {
        let data = vec![16u8; 16];
        let rgba = yuyv_to_rgba(&data, 2, 1);
        assert_eq!(rgba.len(), 8);
    }

    #[test]
    fn test_capture_without_stream_fails() {
        let backend = V4l2Backend::new();
        assert_eq!(backend.capture_frame().unwrap_err(), BackendError::NotStreaming);
        assert!(!backend.is_streaming());
    }
}
