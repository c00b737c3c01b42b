// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for kiosk operations
//!
//! This module provides command-line functionality for:
//! - Listing available cameras
//! - Running one headless session
//! - Syncing, publishing and inspecting the configuration

use photobooth::Kiosk;
use photobooth::backends::camera::CameraBackend;
use photobooth::backends::cloud::CloudServices;
use photobooth::config::KioskSettings;
use photobooth::session::{SessionState, Transition};
use photobooth::storage::{ConfigSync, LocalStore, list_photos};
use photobooth::terminal::{qr_image, qr_lines};
use std::path::PathBuf;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// List all available cameras
pub fn list_cameras(backend: &dyn CameraBackend) -> CliResult {
    let cameras = backend.enumerate_cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", backend.backend_type());
    println!();
    for camera in &cameras {
        println!("  {}  {}", camera.id, camera.name);
        let driver = camera.driver.as_deref().unwrap_or("unknown");
        println!("      Driver: {}  Location: {}", driver, camera.location);
    }
    println!();
    println!("Set one as the preferred camera with `--camera <ID>` or in the theme.");

    Ok(())
}

/// Run one session to the result screen and print its retrieval payload
pub async fn shoot(
    settings: KioskSettings,
    backend: Box<dyn CameraBackend>,
    input: Option<PathBuf>,
    qr_png: Option<PathBuf>,
) -> CliResult {
    let kiosk = Kiosk::assemble(settings, backend, CloudServices::firebase()).await;
    let session = kiosk.spawn_session();
    let mut transitions = session.transitions();

    match input {
        Some(path) => {
            let bytes = tokio::fs::read(&path).await?;
            println!("Using {}", path.display());
            session.ingest(bytes).await?;
        }
        None => {
            // The controller publishes once the device has been tried
            let view = session.wait_for(|v| v.device_error.is_some() || v.session.0 > 0).await?;
            if let Some(e) = view.device_error {
                session.shutdown().await;
                return Err(e.into());
            }
            session.start().await?;
        }
    }

    // Follow the session until it settles
    loop {
        let Transition { to, .. } = transitions.recv().await?;
        println!("  {}", to);
        match to {
            SessionState::Ready => break,
            SessionState::Idle => {
                let view = session.view();
                session.shutdown().await;
                return Err(match view.device_error {
                    Some(e) => e.into(),
                    None => "Session was abandoned".into(),
                });
            }
            _ => {}
        }
    }

    let view = session.view();
    let Some(payload) = view.qr else {
        session.shutdown().await;
        return Err("Session finished without a result".into());
    };

    println!();
    if view.remixed {
        println!("Remixed with style '{}'.", kiosk.remix.style().tag());
    } else {
        println!("Remix unavailable, framed the original capture.");
    }
    for line in qr_lines(&payload.text())? {
        println!("{}", line);
    }
    println!("{}", payload.text());

    if let Some(path) = qr_png {
        qr_image(&payload.text(), 8)?.save(&path)?;
        println!("QR code written to {}", path.display());
    }

    session.shutdown().await;
    Ok(())
}

/// Reconcile the local configuration with the cloud document
pub async fn sync(settings: &KioskSettings) -> CliResult {
    let config = ConfigSync::load(LocalStore::new(&settings.data_dir), CloudServices::firebase()).await;
    if config.credentials().is_none() {
        println!("No cloud credentials in the theme; local configuration only.");
        print_summary(&config);
        return Ok(());
    }

    config.reconcile().await?;
    println!("Configuration reconciled with the cloud.");
    print_summary(&config);
    Ok(())
}

/// Promote embedded assets and write the settings document
pub async fn publish(settings: &KioskSettings) -> CliResult {
    let config = ConfigSync::load(LocalStore::new(&settings.data_dir), CloudServices::firebase()).await;
    let stored = config.publish().await?;
    println!(
        "Published {} frame(s), updated at {}.",
        stored.frames.len(),
        stored.updated_at.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// Print the local counter and saved composites
pub async fn stats(settings: &KioskSettings) -> CliResult {
    let local = LocalStore::new(&settings.data_dir);
    let stats = local.load_stats().await;
    let photos = list_photos(settings.photos_dir()).await;

    println!("Total photos: {}", stats.total_photos);
    println!("Saved on this kiosk: {}", photos.len());
    if let Some(latest) = photos.first() {
        println!("Latest: {}", latest.display());
    }
    Ok(())
}

fn print_summary(config: &ConfigSync) {
    let snapshot = config.snapshot();
    println!("  Event:   {}", snapshot.theme.event_title);
    println!("  Frames:  {}", snapshot.frames.len());
    println!("  Photos:  {}", snapshot.stats.total_photos);
    println!("  Language: {}", config.language().code());
    if let Some(frame) = config.selected_frame() {
        println!("  Frame in use: {} ({})", frame.name, frame.id);
    }
}
