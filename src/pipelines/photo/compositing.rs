// SPDX-License-Identifier: GPL-3.0-only

//! Frame overlay compositing
//!
//! The frame is stretched (never cropped) to the base raster's exact size
//! and drawn on top with alpha-over blending. A frame that cannot be loaded
//! leaves the base untouched.

use super::raster::load_raster;
use crate::config::Frame;
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::{debug, warn};

/// Draw `overlay` over `base`, stretching it to the base dimensions
pub fn composite(base: &RgbaImage, overlay: &RgbaImage) -> RgbaImage {
    let (width, height) = base.dimensions();
    let mut output = base.clone();

    let stretched;
    let overlay = if overlay.dimensions() == (width, height) {
        overlay
    } else {
        stretched = imageops::resize(overlay, width, height, FilterType::Triangle);
        &stretched
    };

    imageops::overlay(&mut output, overlay, 0, 0);
    output
}

/// Composite with the overlay behind a frame reference
///
/// Degrades to returning `base` when there is no frame or it fails to load.
pub async fn composite_with_frame(base: RgbaImage, frame: Option<&Frame>) -> RgbaImage {
    let Some(frame) = frame else {
        debug!("No frame selected, skipping overlay");
        return base;
    };

    match load_raster(&frame.url).await {
        Ok(overlay) => {
            debug!(
                frame = %frame.id,
                overlay_width = overlay.width(),
                overlay_height = overlay.height(),
                "Compositing frame overlay"
            );
            composite(&base, &overlay)
        }
        Err(e) => {
            warn!(frame = %frame.id, error = %e, "Frame overlay failed to load, using base only");
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::photo::raster::to_data_uri;
    use image::Rgba;

    #[test]
    fn test_overlay_is_stretched_to_base() {
        let base = RgbaImage::from_pixel(80, 100, Rgba([0, 0, 255, 255]));
        // Opaque red frame at a different size and ratio
        let overlay = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let out = composite(&base, &overlay);
        assert_eq!(out.dimensions(), (80, 100));
        assert_eq!(out.get_pixel(79, 99), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_transparent_overlay_keeps_base() {
        let base = RgbaImage::from_pixel(8, 10, Rgba([0, 0, 255, 255]));
        let mut overlay = RgbaImage::from_pixel(8, 10, Rgba([0, 0, 0, 0]));
        overlay.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let out = composite(&base, &overlay);
        assert_eq!(out.get_pixel(4, 5), &Rgba([0, 0, 255, 255]));
        assert_eq!(out.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
    }

    #[tokio::test]
    async fn test_unloadable_frame_returns_base_unchanged() {
        let base = RgbaImage::from_pixel(8, 10, Rgba([9, 8, 7, 255]));
        let frame = Frame {
            id: "broken".into(),
            name: "Broken".into(),
            url: "/nonexistent/frame.png".into(),
            is_ai_generated: None,
        };
        let out = composite_with_frame(base.clone(), Some(&frame)).await;
        assert_eq!(out, base);
    }

    #[tokio::test]
    async fn test_no_frame_returns_base_unchanged() {
        let base = RgbaImage::from_pixel(4, 5, Rgba([1, 1, 1, 255]));
        assert_eq!(composite_with_frame(base.clone(), None).await, base);
    }

    #[tokio::test]
    async fn test_frame_from_data_uri_is_applied() {
        let mut png = Vec::new();
        RgbaImage::from_pixel(2, 2, Rgba([0, 255, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let frame = Frame {
            id: "green".into(),
            name: "Green".into(),
            url: to_data_uri("image/png", &png),
            is_ai_generated: Some(true),
        };
        let base = RgbaImage::from_pixel(8, 10, Rgba([0, 0, 0, 255]));
        let out = composite_with_frame(base, Some(&frame)).await;
        assert_eq!(out.get_pixel(3, 3), &Rgba([0, 255, 0, 255]));
    }
}
