// SPDX-License-Identifier: MPL-2.0

//! Photo composite pipeline
//!
//! ```text
//! Raw capture ─▶ Crop-to-ratio ─▶ (remix) ─▶ Normalise ─▶ Composite ─▶ Encode ─▶ Disk
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **Geometry**: crop to the kiosk ratio, mirrored when the preview was
//! 2. **Compositing**: stretch the frame overlay onto the base
//! 3. **Encoding**: JPEG at maximum quality
//! 4. **Disk I/O**: every composite is kept locally, uploaded or not
//!
//! CPU-bound stages run on the blocking pool so the preview keeps flowing.

pub mod compositing;
pub mod encoding;
pub mod geometry;
pub mod raster;

pub use compositing::{composite, composite_with_frame};
pub use encoding::{EncodedImage, EncodingFormat, PhotoEncoder, save_encoded};
pub use geometry::{AspectRatio, CropRect, OutputCanvas, crop_rect, crop_to_ratio};

use crate::config::Frame;
use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Result of the final pipeline stages
#[derive(Debug, Clone)]
pub struct FinishedComposite {
    /// The composite raster, the only artifact presented or uploaded
    pub raster: Arc<RgbaImage>,
    /// Maximum-quality JPEG of `raster`
    pub encoded: EncodedImage,
    /// Where the encoded composite was saved
    pub local_path: PathBuf,
}

/// Geometry, compositing and encoding for one kiosk
#[derive(Debug, Clone)]
pub struct CompositePipeline {
    ratio: AspectRatio,
    canvas: OutputCanvas,
    encoder: PhotoEncoder,
}

impl CompositePipeline {
    pub fn new(canvas: OutputCanvas) -> Self {
        Self {
            ratio: AspectRatio::PORTRAIT,
            canvas,
            encoder: PhotoEncoder::composite(),
        }
    }

    /// Initial crop of a device capture or an uploaded file
    pub async fn crop(&self, raster: RgbaImage, mirror: bool) -> Result<RgbaImage, String> {
        let (ratio, canvas) = (self.ratio, self.canvas);
        tokio::task::spawn_blocking(move || crop_to_ratio(&raster, ratio, mirror, canvas))
            .await
            .map_err(|e| format!("Crop task error: {}", e))
    }

    /// Bring a remixed (or original) raster back to the kiosk ratio, composite
    /// the frame over it, encode and save it under `output_dir`
    pub async fn finish(
        &self,
        base: RgbaImage,
        frame: Option<&Frame>,
        output_dir: PathBuf,
    ) -> Result<FinishedComposite, String> {
        // Remix output is never mirrored again
        let normalized = self.crop(base, false).await?;
        let composed = composite_with_frame(normalized, frame).await;
        let raster = Arc::new(composed);

        let encoded = self.encoder.encode(raster.as_ref().clone()).await?;
        let local_path = save_encoded(&encoded, &output_dir).await?;

        info!(
            width = encoded.width,
            height = encoded.height,
            size = encoded.data.len(),
            path = %local_path.display(),
            "Composite finished"
        );

        Ok(FinishedComposite {
            raster,
            encoded,
            local_path,
        })
    }
}

impl Default for CompositePipeline {
    fn default() -> Self {
        Self::new(OutputCanvas::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[tokio::test]
    async fn test_finish_normalizes_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CompositePipeline::default();
        // Square remix output comes back to 4:5
        let base = RgbaImage::from_pixel(100, 100, Rgba([50, 60, 70, 255]));
        let done = pipeline
            .finish(base, None, dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(done.raster.dimensions(), (80, 100));
        assert!(done.local_path.starts_with(dir.path()));
        assert_eq!(done.encoded.format.extension(), "jpg");
    }

    #[tokio::test]
    async fn test_fixed_canvas_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CompositePipeline::new(OutputCanvas::Fixed {
            width: 40,
            height: 50,
        });
        let cropped = pipeline
            .crop(RgbaImage::new(640, 480), true)
            .await
            .unwrap();
        assert_eq!(cropped.dimensions(), (40, 50));
        let done = pipeline
            .finish(cropped, None, dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!((done.encoded.width, done.encoded.height), (40, 50));
    }
}
