// SPDX-License-Identifier: GPL-3.0-only

//! Capture session controller
//!
//! The controller is a single task that owns the live [`CaptureSession`].
//! User commands arrive on one channel; slow work (countdown, capture,
//! remix, compositing, upload, cleanup) runs in spawned tasks that report
//! back on a second channel, tagged with the session they belong to.
//! Reports for any other session are dropped.
//!
//! ```text
//! Idle ─start─▶ CountingDown ─3 ticks─▶ Capturing ─▶ Remixing ─▶ Compositing
//!   ▲                                                                  │
//!   └── Retaking ◀─retake | auto-reset── Ready ◀──── Uploading ◀───────┘
//! ```

use super::state::*;
use crate::backends::camera::DeviceAcquisitionManager;
use crate::backends::remix::RemixClient;
use crate::config::{FirebaseConfig, KioskSettings};
use crate::constants::session::{COUNTDOWN_INTERVAL, DELETE_TIMEOUT, INPUT_CHANNEL_CAPACITY};
use crate::errors::{AppError, AppResult, DecodeError, DeviceError};
use crate::pipelines::photo::raster::decode_raster;
use crate::pipelines::photo::{CompositePipeline, FinishedComposite};
use crate::storage::{CloudAssetRef, ConfigSync, delete_session_composite, upload_session_composite};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// User input accepted by the controller
#[derive(Clone)]
pub enum SessionCommand {
    /// Begin the countdown (from `Idle`)
    Start,
    /// Discard the result (from `Ready`)
    Retake,
    /// Use an uploaded image instead of the camera (from `Idle`)
    Ingest(Vec<u8>),
    /// Re-enumerate devices and clear a device error (from `Idle`)
    RefreshDevices,
    Shutdown,
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Start => write!(f, "Start"),
            SessionCommand::Retake => write!(f, "Retake"),
            SessionCommand::Ingest(bytes) => write!(f, "Ingest({} bytes)", bytes.len()),
            SessionCommand::RefreshDevices => write!(f, "RefreshDevices"),
            SessionCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// A state change, as seen by presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub session: SessionId,
    pub from: SessionState,
    pub to: SessionState,
}

/// Everything a session needs from the rest of the kiosk
#[derive(Clone)]
pub struct SessionServices {
    pub devices: DeviceAcquisitionManager,
    pub remix: RemixClient,
    pub pipeline: CompositePipeline,
    pub config: Arc<ConfigSync>,
}

/// Reports from spawned work
enum Report {
    Tick(SessionId, u32),
    CountdownDone(SessionId),
    Captured(SessionId, Result<RgbaImage, DeviceError>),
    IngestFailed(SessionId, DecodeError),
    Remixed(SessionId, Option<RgbaImage>),
    Composited(SessionId, Result<FinishedComposite, String>),
    Uploaded(SessionId, Option<(CloudAssetRef, FirebaseConfig)>),
    ResetTick(SessionId, u64),
    ResetElapsed(SessionId),
    CleanupDone(SessionId),
}

impl Report {
    fn session(&self) -> SessionId {
        match self {
            Report::Tick(id, _)
            | Report::CountdownDone(id)
            | Report::Captured(id, _)
            | Report::IngestFailed(id, _)
            | Report::Remixed(id, _)
            | Report::Composited(id, _)
            | Report::Uploaded(id, _)
            | Report::ResetTick(id, _)
            | Report::ResetElapsed(id)
            | Report::CleanupDone(id) => *id,
        }
    }
}

struct SessionController {
    services: SessionServices,
    settings: KioskSettings,
    session: CaptureSession,
    /// Mirror policy of the open stream
    mirror: bool,
    device_error: Option<DeviceError>,
    countdown: Option<u32>,
    reset_remaining: Option<u64>,
    /// Credentials the composite was uploaded with, for the retake delete
    asset_credentials: Option<FirebaseConfig>,
    countdown_task: Option<JoinHandle<()>>,
    auto_reset_task: Option<JoinHandle<()>>,
    reports: mpsc::UnboundedSender<Report>,
    view: watch::Sender<SessionView>,
    transitions: broadcast::Sender<Transition>,
}

/// Control and observe a running session controller
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    transitions: broadcast::Sender<Transition>,
    task: JoinHandle<()>,
}

/// Spawn the controller on the current runtime
///
/// The device is acquired as soon as the controller starts.
pub fn spawn(services: SessionServices, settings: KioskSettings) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let (view_tx, view_rx) = watch::channel(SessionView::default());
    let (transitions, _) = broadcast::channel(64);

    let controller = SessionController {
        services,
        settings,
        session: CaptureSession::new(SessionId(1)),
        mirror: false,
        device_error: None,
        countdown: None,
        reset_remaining: None,
        asset_credentials: None,
        countdown_task: None,
        auto_reset_task: None,
        reports: report_tx,
        view: view_tx,
        transitions: transitions.clone(),
    };

    let task = tokio::spawn(controller.run(command_rx, report_rx));

    SessionHandle {
        commands: command_tx,
        view: view_rx,
        transitions,
        task,
    }
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::Other("session controller stopped".into()))
    }

    pub async fn start(&self) -> AppResult<()> {
        self.send(SessionCommand::Start).await
    }

    pub async fn retake(&self) -> AppResult<()> {
        self.send(SessionCommand::Retake).await
    }

    pub async fn ingest(&self, bytes: Vec<u8>) -> AppResult<()> {
        self.send(SessionCommand::Ingest(bytes)).await
    }

    pub async fn refresh_devices(&self) -> AppResult<()> {
        self.send(SessionCommand::RefreshDevices).await
    }

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Every state change from now on
    ///
    /// The view channel only keeps the latest value; this one does not skip
    /// short-lived states.
    pub fn transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }

    /// Wait until the published view satisfies `predicate`
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionView) -> bool,
    ) -> AppResult<SessionView> {
        let mut view = self.view.clone();
        let found = view
            .wait_for(predicate)
            .await
            .map_err(|_| AppError::Other("session controller stopped".into()))?;
        Ok(found.clone())
    }

    /// Stop the controller and release the device
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session controller ended abnormally");
        }
    }
}

impl SessionController {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut reports: mpsc::UnboundedReceiver<Report>,
    ) {
        info!("Session controller started");
        self.acquire_device().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(report) = reports.recv() => self.handle_report(report).await,
            }
        }

        self.stop_timers();
        self.services.devices.release().await;
        self.services.config.flush().await;
        info!("Session controller stopped");
    }

    fn publish(&self) {
        let composite = self
            .session
            .final_composite()
            .map(|c| Arc::clone(&c.raster));

        self.view.send_replace(SessionView {
            session: self.session.id,
            state: self.session.state,
            countdown: self.countdown,
            reset_remaining: self.reset_remaining,
            device_error: self.device_error.clone(),
            qr: self.session.qr_payload(),
            composite,
            remixed: self.session.remixed_raster.is_some(),
        });
    }

    async fn transition(&mut self, to: SessionState) {
        let from = self.session.state;
        if from == to {
            return;
        }

        self.session.state = to;
        info!(session = %self.session.id, %from, %to, "Session state changed");

        if from.is_capture_eligible() && !to.is_capture_eligible() {
            self.services.devices.release().await;
        }

        let _ = self.transitions.send(Transition {
            session: self.session.id,
            from,
            to,
        });
        self.publish();
    }

    fn stop_timers(&mut self) {
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
        if let Some(task) = self.auto_reset_task.take() {
            task.abort();
        }
    }

    /// Back to `Idle` with a fresh session
    async fn reset_session(&mut self) {
        self.stop_timers();
        self.countdown = None;
        self.reset_remaining = None;
        self.asset_credentials = None;

        let next = self.session.id.next();
        self.transition(SessionState::Idle).await;
        self.session = CaptureSession::new(next);
        debug!(session = %next, "New session prepared");
        self.publish();
    }

    /// Open the preferred (or default) device for the next session
    async fn acquire_device(&mut self) {
        let devices = self.services.devices.clone();
        let preferred = self
            .settings
            .preferred_device(&self.services.config.theme());

        let result = tokio::task::spawn_blocking(move || {
            devices.set_preferred_device(preferred);
            devices.acquire_blocking()
        })
        .await
        .map_err(|e| DeviceError::Unavailable(format!("acquire task failed: {}", e)))
        .and_then(|result| result);

        match result {
            Ok(stream) => {
                self.mirror = stream.mirror;
                self.device_error = None;
            }
            Err(e) => {
                error!(error = %e, "Camera unavailable");
                self.device_error = Some(e);
            }
        }
        self.publish();
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        let state = self.session.state;
        match command {
            SessionCommand::Start if state == SessionState::Idle => {
                if self.device_error.is_some() {
                    warn!("Camera unavailable, refresh devices before starting");
                    return;
                }
                if !self.services.devices.is_streaming() {
                    self.acquire_device().await;
                    if self.device_error.is_some() {
                        return;
                    }
                }
                self.start_countdown().await;
            }
            SessionCommand::Retake if state == SessionState::Ready => {
                info!(session = %self.session.id, "Retake requested");
                self.begin_retake().await;
            }
            SessionCommand::Ingest(bytes) if state == SessionState::Idle => {
                self.begin_ingest(bytes).await;
            }
            SessionCommand::RefreshDevices if state == SessionState::Idle => {
                let devices = self.services.devices.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || devices.refresh()).await {
                    warn!(error = %e, "Device refresh task failed");
                }
                self.device_error = None;
                self.acquire_device().await;
            }
            SessionCommand::Shutdown => {}
            command => {
                debug!(?command, %state, "Command ignored in current state");
            }
        }
    }

    async fn start_countdown(&mut self) {
        let id = self.session.id;
        let ticks = self.settings.countdown_ticks;
        let reports = self.reports.clone();

        self.countdown = Some(ticks);
        self.transition(SessionState::CountingDown).await;

        self.countdown_task = Some(tokio::spawn(async move {
            for remaining in (1..=ticks).rev() {
                let _ = reports.send(Report::Tick(id, remaining));
                tokio::time::sleep(COUNTDOWN_INTERVAL).await;
            }
            let _ = reports.send(Report::CountdownDone(id));
        }));
    }

    async fn begin_capture(&mut self) {
        let id = self.session.id;
        let devices = self.services.devices.clone();
        let pipeline = self.services.pipeline.clone();
        let mirror = self.mirror;
        let reports = self.reports.clone();

        self.countdown = None;
        self.countdown_task = None;
        self.transition(SessionState::Capturing).await;

        tokio::spawn(async move {
            let result = async {
                let frame = devices.capture().await?;
                let raster = frame.to_image().ok_or(DeviceError::NoFrame)?;
                pipeline
                    .crop(raster, mirror)
                    .await
                    .map_err(DeviceError::Unavailable)
            }
            .await;
            let _ = reports.send(Report::Captured(id, result));
        });
    }

    async fn begin_ingest(&mut self, bytes: Vec<u8>) {
        let id = self.session.id;
        let pipeline = self.services.pipeline.clone();
        let reports = self.reports.clone();

        info!(session = %id, size = bytes.len(), "Ingesting uploaded image");
        self.transition(SessionState::Capturing).await;

        tokio::spawn(async move {
            let report = match decode_raster(bytes).await {
                // Uploaded files are never mirrored
                Ok(raster) => match pipeline.crop(raster, false).await {
                    Ok(cropped) => Report::Captured(id, Ok(cropped)),
                    Err(e) => Report::IngestFailed(id, DecodeError::Format(e)),
                },
                Err(e) => Report::IngestFailed(id, e),
            };
            let _ = reports.send(report);
        });
    }

    async fn handle_report(&mut self, report: Report) {
        if report.session() != self.session.id {
            debug!(
                report_session = %report.session(),
                current = %self.session.id,
                "Dropping result of a finished session"
            );
            return;
        }

        let state = self.session.state;
        match report {
            Report::Tick(_, remaining) if state == SessionState::CountingDown => {
                self.countdown = Some(remaining);
                self.publish();
            }
            Report::CountdownDone(_) if state == SessionState::CountingDown => {
                self.begin_capture().await;
            }
            Report::Captured(_, Ok(raster)) if state == SessionState::Capturing => {
                self.begin_remix(raster).await;
            }
            Report::Captured(_, Err(e)) if state == SessionState::Capturing => {
                error!(session = %self.session.id, error = %e, "Capture failed");
                self.device_error = Some(e);
                self.services.devices.release().await;
                self.reset_session().await;
            }
            Report::IngestFailed(_, e) if state == SessionState::Capturing => {
                warn!(session = %self.session.id, error = %e, "Uploaded image rejected");
                self.reset_session().await;
            }
            Report::Remixed(_, remixed) if state == SessionState::Remixing => {
                self.begin_compositing(remixed).await;
            }
            Report::Composited(_, Ok(composite)) if state == SessionState::Compositing => {
                self.begin_upload(composite).await;
            }
            Report::Composited(_, Err(e)) if state == SessionState::Compositing => {
                error!(session = %self.session.id, error = %e, "Compositing failed, abandoning session");
                self.reset_session().await;
                self.acquire_device().await;
            }
            Report::Uploaded(_, uploaded) if state == SessionState::Uploading => {
                if let Some((asset, credentials)) = uploaded
                    && self.session.set_cloud_asset_ref(asset)
                {
                    self.asset_credentials = Some(credentials);
                }
                self.enter_ready().await;
            }
            Report::ResetTick(_, remaining) if state == SessionState::Ready => {
                self.reset_remaining = Some(remaining);
                self.publish();
            }
            Report::ResetElapsed(_) if state == SessionState::Ready => {
                info!(session = %self.session.id, "Result timed out, resetting");
                self.begin_retake().await;
            }
            Report::CleanupDone(_) if state == SessionState::Retaking => {
                self.reset_session().await;
                self.acquire_device().await;
            }
            _ => debug!(%state, "Report ignored in current state"),
        }
    }

    async fn begin_remix(&mut self, raster: RgbaImage) {
        let id = self.session.id;
        let raw = Arc::new(raster);
        self.session.raw_capture = Some(Arc::clone(&raw));
        self.transition(SessionState::Remixing).await;

        let remix = self.services.remix.clone();
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let remixed = remix.remix(&raw).await.ok();
            let _ = reports.send(Report::Remixed(id, remixed));
        });
    }

    async fn begin_compositing(&mut self, remixed: Option<RgbaImage>) {
        let id = self.session.id;
        self.session.remixed_raster = remixed.map(Arc::new);

        // Remix failure composites the original capture
        let base = match (&self.session.remixed_raster, &self.session.raw_capture) {
            (Some(remixed), _) => remixed.as_ref().clone(),
            (None, Some(raw)) => raw.as_ref().clone(),
            (None, None) => {
                error!(session = %id, "No capture to composite");
                self.reset_session().await;
                self.acquire_device().await;
                return;
            }
        };
        self.transition(SessionState::Compositing).await;

        let frame = self.services.config.selected_frame();
        let pipeline = self.services.pipeline.clone();
        let output_dir = self.settings.photos_dir();
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let result = pipeline.finish(base, frame.as_ref(), output_dir).await;
            let _ = reports.send(Report::Composited(id, result));
        });
    }

    async fn begin_upload(&mut self, composite: FinishedComposite) {
        let id = self.session.id;
        let encoded = composite.encoded.clone();
        self.session.set_final_composite(composite);
        self.transition(SessionState::Uploading).await;

        let credentials = self.services.config.credentials();
        let cloud = self.services.config.cloud().clone();
        let reports = self.reports.clone();
        tokio::spawn(async move {
            let uploaded = match credentials {
                Some(credentials) => {
                    match upload_session_composite(&cloud, &credentials, &encoded).await {
                        Ok(asset) => Some((asset, credentials)),
                        Err(e) => {
                            warn!(session = %id, error = %e, "Upload failed, result stays local");
                            None
                        }
                    }
                }
                None => {
                    debug!(session = %id, "No cloud credentials, result stays local");
                    None
                }
            };
            let _ = reports.send(Report::Uploaded(id, uploaded));
        });
    }

    async fn enter_ready(&mut self) {
        let id = self.session.id;
        let secs = self.settings.auto_reset_secs;

        self.session.auto_reset_deadline = Some(Instant::now() + Duration::from_secs(secs));
        self.reset_remaining = Some(secs);
        self.transition(SessionState::Ready).await;

        self.services.config.record_completed_session().await;

        let reports = self.reports.clone();
        self.auto_reset_task = Some(tokio::spawn(async move {
            for remaining in (1..=secs).rev() {
                let _ = reports.send(Report::ResetTick(id, remaining));
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            let _ = reports.send(Report::ResetElapsed(id));
        }));
    }

    async fn begin_retake(&mut self) {
        let id = self.session.id;
        if let Some(task) = self.auto_reset_task.take() {
            task.abort();
        }
        self.session.auto_reset_deadline = None;
        self.reset_remaining = None;

        let asset = self.session.take_cloud_asset_ref();
        let credentials = self.asset_credentials.take();
        self.transition(SessionState::Retaking).await;

        // The delete runs on its own; the reset never waits for it
        if let (Some(asset), Some(credentials)) = (asset, credentials) {
            let cloud = self.services.config.cloud().clone();
            tokio::spawn(async move {
                let delete = delete_session_composite(&cloud, &credentials, &asset);
                match tokio::time::timeout(DELETE_TIMEOUT, delete).await {
                    Ok(Ok(())) => info!(session = %id, url = %asset.url, "Uploaded composite deleted"),
                    // Already logged by the store layer
                    Ok(Err(_)) => {}
                    Err(_) => warn!(session = %id, url = %asset.url, "Composite delete timed out"),
                }
            });
        }
        let _ = self.reports.send(Report::CleanupDone(id));
    }
}
