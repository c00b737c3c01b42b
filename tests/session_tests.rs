// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture session controller
//!
//! Sessions run against a still image camera, the in-memory cloud store and
//! scripted remix services.

use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use photobooth::backends::camera::StillImageBackend;
use photobooth::backends::cloud::{BlobStore, CloudServices, MemoryStore};
use photobooth::backends::remix::{RemixClient, RemixRequest, RemixService, RemixStyle};
use photobooth::config::{FirebaseConfig, KioskSettings, ThemeConfig};
use photobooth::errors::{RemixError, StoreError};
use photobooth::session::{QrPayload, SessionHandle, SessionState, Transition};
use photobooth::storage::LocalStore;
use photobooth::{Kiosk, SessionView};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

const STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Remix service that always fails
struct FailingRemix {
    calls: AtomicUsize,
}

#[async_trait]
impl RemixService for FailingRemix {
    async fn remix(&self, _request: RemixRequest) -> Result<Vec<u8>, RemixError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RemixError::Request("429 quota exhausted".into()))
    }
}

/// Remix service answering with a solid green square
struct GreenRemix;

#[async_trait]
impl RemixService for GreenRemix {
    async fn remix(&self, _request: RemixRequest) -> Result<Vec<u8>, RemixError> {
        let img = RgbaImage::from_pixel(64, 64, Rgba([0, 255, 0, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode remix result");
        Ok(bytes)
    }
}

/// Blob store whose deletes never complete
struct StalledDeletes(Arc<MemoryStore>);

#[async_trait]
impl BlobStore for StalledDeletes {
    async fn put_blob(
        &self,
        credentials: &FirebaseConfig,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
    ) -> Result<String, StoreError> {
        self.0.put_blob(credentials, bytes, path, content_type).await
    }

    async fn delete_blob(
        &self,
        _credentials: &FirebaseConfig,
        _url_or_path: &str,
    ) -> Result<(), StoreError> {
        std::future::pending().await
    }
}

fn write_capture(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("capture.png");
    RgbaImage::from_fn(160, 120, |x, _| Rgba([(x % 256) as u8, 40, 200, 255]))
        .save(&path)
        .expect("write still image");
    path
}

fn credentials() -> FirebaseConfig {
    FirebaseConfig {
        api_key: "key".into(),
        project_id: "booth".into(),
        storage_bucket: "booth.appspot.com".into(),
        ..Default::default()
    }
}

struct Harness {
    _dir: TempDir,
    kiosk: Kiosk,
    memory: Arc<MemoryStore>,
}

async fn harness(online: bool, remix: Arc<dyn RemixService>, auto_reset_secs: u64) -> Harness {
    harness_with_blobs(online, remix, auto_reset_secs, |memory| memory).await
}

async fn harness_with_blobs(
    online: bool,
    remix: Arc<dyn RemixService>,
    auto_reset_secs: u64,
    blobs: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn BlobStore>,
) -> Harness {
    let dir = TempDir::new().expect("temp dir");
    let image = write_capture(dir.path());
    let data_dir = dir.path().join("data");

    if online {
        let theme = ThemeConfig {
            firebase_config: Some(credentials()),
            ..ThemeConfig::default()
        };
        LocalStore::new(&data_dir)
            .save_theme(&theme)
            .await
            .expect("seed theme");
    }

    let settings = KioskSettings {
        data_dir,
        countdown_ticks: 1,
        auto_reset_secs,
        ..KioskSettings::default()
    };
    let memory = Arc::new(MemoryStore::new());
    let cloud = CloudServices::new(memory.clone(), blobs(memory.clone()));
    let kiosk = Kiosk::assemble(settings, Box::new(StillImageBackend::new(image)), cloud)
        .await
        .with_remix(RemixClient::new(remix, RemixStyle::Mascot));

    Harness {
        _dir: dir,
        kiosk,
        memory,
    }
}

async fn next_transition(rx: &mut broadcast::Receiver<Transition>) -> Transition {
    tokio::time::timeout(STEP_TIMEOUT, rx.recv())
        .await
        .expect("transition within timeout")
        .expect("transition channel open")
}

/// Collect transitions until `target` is reached
async fn follow_until(rx: &mut broadcast::Receiver<Transition>, target: SessionState) -> Vec<SessionState> {
    let mut seen = Vec::new();
    loop {
        let t = next_transition(rx).await;
        seen.push(t.to);
        if t.to == target {
            return seen;
        }
    }
}

async fn wait_view(session: &SessionHandle, predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
    tokio::time::timeout(STEP_TIMEOUT, session.wait_for(predicate))
        .await
        .expect("view within timeout")
        .expect("controller running")
}

/// Deletes run detached from the reset; wait for `count` of them
async fn wait_for_deletes(memory: &MemoryStore, count: usize) -> Vec<String> {
    tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let requests = memory.delete_requests();
            if requests.len() >= count {
                return requests;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("delete within timeout")
}

async fn wait_until_armed(session: &SessionHandle) {
    let view = wait_view(session, |v| v.session.0 > 0).await;
    assert!(view.device_error.is_none(), "camera should open: {:?}", view.device_error);
}

#[tokio::test]
async fn test_remix_failure_still_reaches_ready_offline() {
    let remix = Arc::new(FailingRemix {
        calls: AtomicUsize::new(0),
    });
    let h = harness(false, remix.clone(), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.start().await.unwrap();
    let seen = follow_until(&mut transitions, SessionState::Ready).await;
    assert_eq!(
        seen,
        vec![
            SessionState::CountingDown,
            SessionState::Capturing,
            SessionState::Remixing,
            SessionState::Compositing,
            SessionState::Uploading,
            SessionState::Ready,
        ]
    );

    let view = session.view();
    assert!(!view.remixed);
    assert_eq!(remix.calls.load(Ordering::SeqCst), 1);

    let composite = view.composite.expect("composite presented");
    assert_eq!(composite.width() * 5, composite.height() * 4);

    match view.qr {
        Some(QrPayload::LocalOnly(path)) => assert!(path.is_file()),
        other => panic!("expected a local-only payload, got {:?}", other),
    }

    session.shutdown().await;
    assert_eq!(h.kiosk.config.stats().total_photos, 1);
    assert_eq!(h.memory.blob_count(), 0);
}

#[tokio::test]
async fn test_online_session_uploads_and_counts() {
    let h = harness(true, Arc::new(GreenRemix), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.start().await.unwrap();
    follow_until(&mut transitions, SessionState::Ready).await;

    let view = session.view();
    assert!(view.remixed);
    let Some(QrPayload::Cloud(url)) = view.qr.clone() else {
        panic!("expected a cloud payload, got {:?}", view.qr);
    };
    assert!(url.starts_with("memory://photos/booth_"));
    assert!(url.ends_with(".jpg"));
    assert_eq!(h.memory.blob_count(), 1);

    // Remote increment is flushed on shutdown
    session.shutdown().await;
    assert_eq!(h.memory.counter(), Some(1));
    assert_eq!(h.kiosk.config.stats().total_photos, 1);
}

#[tokio::test]
async fn test_retake_deletes_uploaded_composite_once() {
    let h = harness(true, Arc::new(GreenRemix), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.start().await.unwrap();
    follow_until(&mut transitions, SessionState::Ready).await;
    let Some(QrPayload::Cloud(url)) = session.view().qr else {
        panic!("expected a cloud payload");
    };
    let first = session.view().session;

    session.retake().await.unwrap();
    // A second retake while cleaning up is ignored
    session.retake().await.unwrap();
    let seen = follow_until(&mut transitions, SessionState::Idle).await;
    assert_eq!(seen, vec![SessionState::Retaking, SessionState::Idle]);

    let view = wait_view(&session, |v| v.session != first).await;
    assert_eq!(view.state, SessionState::Idle);
    assert!(view.qr.is_none());
    assert!(view.composite.is_none());

    assert_eq!(wait_for_deletes(&h.memory, 1).await, vec![url]);
    assert_eq!(h.memory.blob_count(), 0);

    session.shutdown().await;
    // The counter is not rolled back by a retake
    assert_eq!(h.memory.counter(), Some(1));
}

#[tokio::test]
async fn test_stuck_delete_does_not_hold_up_reset() {
    let h = harness_with_blobs(true, Arc::new(GreenRemix), 3600, |memory| {
        Arc::new(StalledDeletes(memory))
    })
    .await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.start().await.unwrap();
    follow_until(&mut transitions, SessionState::Ready).await;
    assert!(matches!(session.view().qr, Some(QrPayload::Cloud(_))));

    session.retake().await.unwrap();
    // Well inside the delete timeout
    let seen = tokio::time::timeout(
        Duration::from_secs(2),
        follow_until(&mut transitions, SessionState::Idle),
    )
    .await
    .expect("reset without waiting for the delete");
    assert_eq!(seen, vec![SessionState::Retaking, SessionState::Idle]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_auto_reset_returns_to_idle_once() {
    let h = harness(true, Arc::new(GreenRemix), 1).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.start().await.unwrap();
    follow_until(&mut transitions, SessionState::Ready).await;
    let seen = follow_until(&mut transitions, SessionState::Idle).await;
    assert_eq!(seen, vec![SessionState::Retaking, SessionState::Idle]);

    // Nothing else fires for the finished session
    let quiet = tokio::time::timeout(Duration::from_millis(1500), transitions.recv()).await;
    assert!(quiet.is_err(), "unexpected transition: {:?}", quiet);
    assert_eq!(wait_for_deletes(&h.memory, 1).await.len(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_commands_outside_their_state_are_ignored() {
    let h = harness(false, Arc::new(GreenRemix), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    // Retake from Idle does nothing
    session.retake().await.unwrap();

    session.start().await.unwrap();
    let first = next_transition(&mut transitions).await;
    assert_eq!(first.to, SessionState::CountingDown);

    // Start while counting down does not restart the countdown
    session.start().await.unwrap();
    let seen = follow_until(&mut transitions, SessionState::Ready).await;
    assert!(!seen.contains(&SessionState::CountingDown));
    assert_eq!(seen.first(), Some(&SessionState::Capturing));

    // Start on the result screen is ignored as well
    session.start().await.unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(500), transitions.recv()).await;
    assert!(quiet.is_err());
    assert_eq!(session.view().state, SessionState::Ready);

    session.shutdown().await;
}

#[tokio::test]
async fn test_ingested_image_skips_countdown() {
    let h = harness(false, Arc::new(GreenRemix), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    let mut bytes = Vec::new();
    RgbaImage::from_pixel(300, 200, Rgba([200, 10, 10, 255]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    session.ingest(bytes).await.unwrap();

    let seen = follow_until(&mut transitions, SessionState::Ready).await;
    assert_eq!(seen.first(), Some(&SessionState::Capturing));
    assert!(!seen.contains(&SessionState::CountingDown));

    session.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_upload_returns_to_idle() {
    let h = harness(false, Arc::new(GreenRemix), 3600).await;
    let session = h.kiosk.spawn_session();
    let mut transitions = session.transitions();
    wait_until_armed(&session).await;

    session.ingest(b"definitely not an image".to_vec()).await.unwrap();
    let seen = follow_until(&mut transitions, SessionState::Idle).await;
    assert_eq!(seen, vec![SessionState::Capturing, SessionState::Idle]);

    session.shutdown().await;
    assert_eq!(h.kiosk.config.stats().total_photos, 0);
}

#[tokio::test]
async fn test_missing_camera_blocks_start_until_refresh() {
    let dir = TempDir::new().unwrap();
    let settings = KioskSettings {
        data_dir: dir.path().join("data"),
        countdown_ticks: 1,
        ..KioskSettings::default()
    };
    let (cloud, _memory) = CloudServices::in_memory();
    let backend = StillImageBackend::new(dir.path().join("missing.png"));
    let kiosk = Kiosk::assemble(settings, Box::new(backend), cloud).await;

    let session = kiosk.spawn_session();
    let mut transitions = session.transitions();
    let view = wait_view(&session, |v| v.device_error.is_some()).await;
    assert_eq!(view.state, SessionState::Idle);

    session.start().await.unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(500), transitions.recv()).await;
    assert!(quiet.is_err(), "start must be ignored without a camera");

    // The file appears; a refresh recovers
    write_capture(dir.path());
    std::fs::rename(dir.path().join("capture.png"), dir.path().join("missing.png")).unwrap();
    session.refresh_devices().await.unwrap();
    wait_view(&session, |v| v.device_error.is_none()).await;

    session.start().await.unwrap();
    assert_eq!(next_transition(&mut transitions).await.to, SessionState::CountingDown);

    session.shutdown().await;
}
