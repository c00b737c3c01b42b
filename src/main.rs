// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use photobooth::Kiosk;
use photobooth::backends::camera::{
    CameraBackend, CameraBackendType, get_backend, get_default_backend,
};
use photobooth::backends::cloud::CloudServices;
use photobooth::backends::remix::RemixStyle;
use photobooth::config::KioskSettings;
use photobooth::constants;
use photobooth::pipelines::photo::OutputCanvas;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "photobooth")]
#[command(about = "Walk-up photo kiosk with mascot remix and cloud hand-off")]
#[command(version = env!("GIT_VERSION"))]
#[command(subcommand_required = false)]
struct Cli {
    /// Serve this image file as the camera instead of a V4L2 device
    #[arg(long, global = true)]
    still_image: Option<PathBuf>,

    /// Remix style
    #[arg(long, global = true, value_enum)]
    style: Option<RemixStyle>,

    /// Data directory (default: ~/.local/share/photobooth)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Seconds the result stays on screen before the kiosk resets
    #[arg(long, global = true)]
    auto_reset: Option<u64>,

    /// Scale captures onto a fixed 1080x1350 canvas instead of keeping the source resolution
    #[arg(long, global = true)]
    fixed_canvas: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kiosk in the terminal (default)
    Kiosk,

    /// List available cameras
    List,

    /// Run one session and print the retrieval QR code
    Shoot {
        /// Use this image instead of the camera
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Camera id to use (from 'photobooth list')
        #[arg(short, long)]
        camera: Option<String>,

        /// Also write the QR code as a PNG
        #[arg(long)]
        qr_png: Option<PathBuf>,
    },

    /// Reconcile the local configuration with the cloud
    Sync,

    /// Upload embedded assets and publish the configuration to the cloud
    Publish,

    /// Show the photo counter
    Stats,
}

impl Cli {
    fn settings(&self) -> KioskSettings {
        let mut settings = KioskSettings::from_env();
        if let Some(style) = self.style {
            settings.remix_style = style;
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
        if let Some(secs) = self.auto_reset {
            settings.auto_reset_secs = secs.max(1);
        }
        if self.fixed_canvas {
            settings.canvas = OutputCanvas::FIXED_PORTRAIT;
        }
        settings
    }

    fn backend(&self) -> Result<Box<dyn CameraBackend>, Box<dyn std::error::Error>> {
        let backend_type = match self.still_image {
            Some(_) => CameraBackendType::StillImage,
            None => get_default_backend(),
        };
        Ok(get_backend(backend_type, self.still_image.clone())?)
    }
}

fn init_logging(log_file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=photobooth=debug, RUST_LOG=info
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    match log_file {
        // The terminal kiosk owns the screen, so logs go to a file
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = cli.settings();
    let runtime = tokio::runtime::Runtime::new()?;

    match &cli.command {
        None | Some(Commands::Kiosk) => {
            init_logging(Some(
                settings.data_dir.join(constants::local_store::LOG_FILE),
            ))?;
            let backend = cli.backend()?;
            let kiosk = runtime.block_on(Kiosk::assemble(
                settings,
                backend,
                CloudServices::firebase(),
            ));
            photobooth::terminal::run(&runtime, kiosk)
        }
        Some(Commands::List) => {
            init_logging(None)?;
            cli::list_cameras(cli.backend()?.as_ref())
        }
        Some(Commands::Shoot {
            input,
            camera,
            qr_png,
        }) => {
            init_logging(None)?;
            settings.camera_override = camera.clone();
            let backend = cli.backend()?;
            runtime.block_on(cli::shoot(
                settings,
                backend,
                input.clone(),
                qr_png.clone(),
            ))
        }
        Some(Commands::Sync) => {
            init_logging(None)?;
            runtime.block_on(cli::sync(&settings))
        }
        Some(Commands::Publish) => {
            init_logging(None)?;
            runtime.block_on(cli::publish(&settings))
        }
        Some(Commands::Stats) => {
            init_logging(None)?;
            runtime.block_on(cli::stats(&settings))
        }
    }
}
