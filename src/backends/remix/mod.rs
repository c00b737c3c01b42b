// SPDX-License-Identifier: MPL-2.0

//! Remote remix client
//!
//! Sends a downscaled capture to a generative image service that adds the
//! mascot, and hands back the returned raster. Any failure is reported as a
//! single recoverable [`RemixUnavailable`]; callers composite the original
//! capture instead. Exactly one attempt is made per call.

pub mod gemini;

pub use gemini::GeminiRemix;

use crate::config::KioskSettings;
use crate::errors::RemixError;
use crate::pipelines::photo::raster::decode_raster;
use crate::pipelines::photo::{EncodedImage, PhotoEncoder};
use async_trait::async_trait;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Instruction set sent with the capture
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum RemixStyle {
    /// Place the kiosk mascot beside the subject
    #[default]
    Mascot,
    Cyberpunk,
    Anime,
    Portrait,
}

impl RemixStyle {
    pub fn tag(&self) -> &'static str {
        match self {
            RemixStyle::Mascot => "mascot",
            RemixStyle::Cyberpunk => "cyberpunk",
            RemixStyle::Anime => "anime",
            RemixStyle::Portrait => "portrait",
        }
    }

    /// Fixed instruction text for this style
    pub fn instruction(&self) -> &'static str {
        match self {
            RemixStyle::Mascot => MASCOT_INSTRUCTION,
            RemixStyle::Cyberpunk => {
                "Restyle this photo as futuristic cyberpunk with neon lighting. \
                 Keep the people recognisable and keep the 4:5 portrait framing."
            }
            RemixStyle::Anime => {
                "Redraw this photo as high quality Japanese anime. \
                 Keep every person's pose and keep the 4:5 portrait framing."
            }
            RemixStyle::Portrait => {
                "Retouch this photo like a professional portrait photographer: \
                 improve lighting and colour only. Keep the 4:5 portrait framing."
            }
        }
    }
}

const MASCOT_INSTRUCTION: &str = "You are a professional photo editor. \
The input photo is a 4:5 portrait. Add the mascot Aiyogu to it.

Keep every person, the background and the lighting exactly as they are. \
Keep the composition centred so it survives a 4:5 crop.

Aiyogu: a plump, round, vibrant orange 3D character with large curved horns \
ringed in glowing cyan, sparkling eyes, glowing cheeks and a gold chain with \
an \"Aiyogu\" pendant.

Placement: Aiyogu stands beside the subject as a companion and fills about \
25 to 30 percent of the frame. Match the scene's lighting and shadows.";

/// One submission to the remix service
#[derive(Debug, Clone)]
pub struct RemixRequest {
    /// Encoded submission raster
    pub raster_bytes: Vec<u8>,
    /// MIME type of `raster_bytes`
    pub mime_type: &'static str,
    pub style: RemixStyle,
}

/// A generative remix backend
#[async_trait]
pub trait RemixService: Send + Sync {
    /// Submit once; returns the encoded result raster
    async fn remix(&self, request: RemixRequest) -> Result<Vec<u8>, RemixError>;
}

/// Backend used when no API key is configured
#[derive(Debug, Default)]
pub struct UnconfiguredRemix;

#[async_trait]
impl RemixService for UnconfiguredRemix {
    async fn remix(&self, _request: RemixRequest) -> Result<Vec<u8>, RemixError> {
        Err(RemixError::NotConfigured)
    }
}

/// The single recoverable remix outcome
#[derive(Debug, Clone, Error)]
#[error("Remix unavailable: {0}")]
pub struct RemixUnavailable(#[from] pub RemixError);

/// Downscale, submit and decode
#[derive(Clone)]
pub struct RemixClient {
    service: Arc<dyn RemixService>,
    style: RemixStyle,
    max_width: u32,
    quality: u8,
}

impl RemixClient {
    pub fn new(service: Arc<dyn RemixService>, style: RemixStyle) -> Self {
        Self {
            service,
            style,
            max_width: crate::constants::remix::MAX_WIDTH,
            quality: crate::constants::remix::JPEG_QUALITY,
        }
    }

    /// Client configured from kiosk settings; falls back to an always
    /// unavailable service when no API key is set
    pub fn from_settings(settings: &KioskSettings) -> Self {
        let service: Arc<dyn RemixService> = match &settings.remix_api_key {
            Some(key) => Arc::new(GeminiRemix::new(
                &settings.remix_endpoint,
                &settings.remix_model,
                key,
            )),
            None => {
                info!("No remix API key configured, captures will not be remixed");
                Arc::new(UnconfiguredRemix)
            }
        };

        Self::new(service, settings.remix_style)
            .with_submission(settings.remix_max_width, settings.remix_quality)
    }

    /// Override the submission bound and quality
    pub fn with_submission(mut self, max_width: u32, quality: u8) -> Self {
        self.max_width = max_width.max(1);
        self.quality = quality;
        self
    }

    pub fn style(&self) -> RemixStyle {
        self.style
    }

    /// Remix `raster`; never fails fatally
    pub async fn remix(&self, raster: &RgbaImage) -> Result<RgbaImage, RemixUnavailable> {
        match self.attempt(raster).await {
            Ok(remixed) => {
                info!(
                    width = remixed.width(),
                    height = remixed.height(),
                    "Remix succeeded"
                );
                Ok(remixed)
            }
            Err(e) => {
                warn!(error = %e, "Remix unavailable, falling back to original capture");
                Err(RemixUnavailable(e))
            }
        }
    }

    async fn attempt(&self, raster: &RgbaImage) -> Result<RgbaImage, RemixError> {
        let submission = {
            let raster = raster.clone();
            let (max_width, quality) = (self.max_width, self.quality);
            tokio::task::spawn_blocking(move || prepare_submission(&raster, max_width, quality))
                .await
                .map_err(|e| RemixError::InvalidRaster(e.to_string()))?
                .map_err(RemixError::InvalidRaster)?
        };

        debug!(
            width = submission.width,
            height = submission.height,
            size = submission.data.len(),
            style = self.style.tag(),
            "Submitting capture for remix"
        );

        let bytes = self
            .service
            .remix(RemixRequest {
                raster_bytes: submission.data,
                mime_type: submission.format.mime_type(),
                style: self.style,
            })
            .await?;

        decode_raster(bytes)
            .await
            .map_err(|e| RemixError::InvalidRaster(e.to_string()))
    }
}

impl std::fmt::Debug for RemixClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemixClient")
            .field("style", &self.style)
            .field("max_width", &self.max_width)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

/// Bound the width and re-encode as JPEG
///
/// Always re-encodes, even when no resize is needed.
pub fn prepare_submission(
    raster: &RgbaImage,
    max_width: u32,
    quality: u8,
) -> Result<EncodedImage, String> {
    let (width, height) = raster.dimensions();
    let resized;
    let source = if width > max_width {
        let new_height = ((height as f64 * max_width as f64) / width as f64).round() as u32;
        resized = imageops::resize(raster, max_width, new_height.max(1), FilterType::Triangle);
        &resized
    } else {
        raster
    };

    PhotoEncoder::jpeg(quality).encode_sync(source)
}
