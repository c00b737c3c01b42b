// SPDX-License-Identifier: GPL-3.0-only

//! Raster encoding
//!
//! Rasters leave the process in three shapes: the final composite (JPEG at
//! the codec's maximum quality), the remix submission (JPEG at a reduced
//! quality) and promoted frame or branding assets (PNG, alpha kept).

use crate::constants::encoding::COMPOSITE_JPEG_QUALITY;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, RgbaImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Container format of an encoded raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// Lossy, no alpha; quality 1-100
    Jpeg { quality: u8 },
    Png,
}

impl EncodingFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg { .. } => "jpg",
            EncodingFormat::Png => "png",
        }
    }

    /// MIME type sent with uploads
    pub fn mime_type(&self) -> &'static str {
        match self {
            EncodingFormat::Jpeg { .. } => "image/jpeg",
            EncodingFormat::Png => "image/png",
        }
    }
}

/// Encoded bytes plus what they contain
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub format: EncodingFormat,
    pub width: u32,
    pub height: u32,
}

/// Encoder for one output format
#[derive(Debug, Clone, Copy)]
pub struct PhotoEncoder {
    format: EncodingFormat,
}

impl PhotoEncoder {
    /// Final composites
    pub fn composite() -> Self {
        Self::jpeg(COMPOSITE_JPEG_QUALITY)
    }

    pub fn jpeg(quality: u8) -> Self {
        Self {
            format: EncodingFormat::Jpeg {
                quality: quality.clamp(1, 100),
            },
        }
    }

    pub fn png() -> Self {
        Self {
            format: EncodingFormat::Png,
        }
    }

    pub fn format(&self) -> EncodingFormat {
        self.format
    }

    /// Encode on the blocking pool
    pub async fn encode(&self, image: RgbaImage) -> Result<EncodedImage, String> {
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode_sync(&image))
            .await
            .map_err(|e| format!("Encoding task error: {}", e))?
    }

    /// Encode on the current thread
    pub fn encode_sync(&self, image: &RgbaImage) -> Result<EncodedImage, String> {
        let (width, height) = image.dimensions();
        let mut data = Vec::new();

        match self.format {
            EncodingFormat::Jpeg { quality } => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut data, quality)
                    .encode_image(&rgb)
                    .map_err(|e| format!("JPEG encoding failed: {}", e))?;
            }
            EncodingFormat::Png => {
                PngEncoder::new(&mut data)
                    .write_image(image.as_raw(), width, height, image::ExtendedColorType::Rgba8)
                    .map_err(|e| format!("PNG encoding failed: {}", e))?;
            }
        }

        debug!(width, height, format = ?self.format, size = data.len(), "Raster encoded");
        Ok(EncodedImage {
            data,
            format: self.format,
            width,
            height,
        })
    }
}

/// Write `encoded` under `output_dir` with a timestamped name
pub async fn save_encoded(encoded: &EncodedImage, output_dir: &Path) -> Result<PathBuf, String> {
    let filename = format!(
        "booth_{}.{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S_%3f"),
        encoded.format.extension()
    );
    let path = output_dir.join(filename);

    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| format!("Failed to create {}: {}", output_dir.display(), e))?;
    tokio::fs::write(&path, &encoded.data)
        .await
        .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    info!(path = %path.display(), size = encoded.data.len(), "Composite saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(
            PhotoEncoder::jpeg(0).format(),
            EncodingFormat::Jpeg { quality: 1 }
        );
        assert_eq!(
            PhotoEncoder::composite().format(),
            EncodingFormat::Jpeg { quality: 100 }
        );
    }

    #[test]
    fn test_jpeg_output_decodes_with_same_size() {
        let image = RgbaImage::from_pixel(40, 50, Rgba([10, 200, 30, 255]));
        let encoded = PhotoEncoder::composite().encode_sync(&image).unwrap();
        assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
        assert_eq!(encoded.format.mime_type(), "image/jpeg");
        let decoded = image::load_from_memory(&encoded.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 50));
    }

    #[test]
    fn test_png_keeps_alpha() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 0]));
        let encoded = PhotoEncoder::png().encode_sync(&image).unwrap();
        let decoded = image::load_from_memory(&encoded.data).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(1, 1)[3], 0);
    }

    #[tokio::test]
    async fn test_save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let encoded = PhotoEncoder::png().encode(RgbaImage::new(4, 5)).await.unwrap();
        let path = save_encoded(&encoded, &dir.path().join("photos")).await.unwrap();
        assert!(path.is_file());
        assert_eq!(path.extension().unwrap(), "png");
    }
}
