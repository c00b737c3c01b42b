// SPDX-License-Identifier: GPL-3.0-only

//! Crop-to-ratio geometry
//!
//! Captures, uploads and remix results are all normalised to the same
//! portrait ratio before compositing. The crop keeps the full extent of the
//! constraining axis and centres on the other one.

use crate::constants::geometry::{
    FIXED_CANVAS_HEIGHT, FIXED_CANVAS_WIDTH, TARGET_RATIO_DEN, TARGET_RATIO_NUM,
};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use tracing::debug;

/// Width:height ratio expressed as an exact fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AspectRatio {
    pub num: u32,
    pub den: u32,
}

impl AspectRatio {
    /// The kiosk's single output ratio (4:5 portrait)
    pub const PORTRAIT: AspectRatio = AspectRatio {
        num: TARGET_RATIO_NUM,
        den: TARGET_RATIO_DEN,
    };

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

/// Source rectangle to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How large the cropped output is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputCanvas {
    /// Output is exactly the crop rectangle (keeps sensor resolution)
    #[default]
    Source,
    /// Crop rectangle is scaled into a fixed canvas
    Fixed { width: u32, height: u32 },
}

impl OutputCanvas {
    /// 1080x1350 fixed canvas
    pub const FIXED_PORTRAIT: OutputCanvas = OutputCanvas::Fixed {
        width: FIXED_CANVAS_WIDTH,
        height: FIXED_CANVAS_HEIGHT,
    };
}

/// Compute the centred crop of a `width`x`height` source for `ratio`
///
/// Wider sources keep their full height; taller (or equal) sources keep
/// their full width. Degenerate sizes still yield a rectangle of at least 1x1.
pub fn crop_rect(width: u32, height: u32, ratio: AspectRatio) -> CropRect {
    let width = width.max(1);
    let height = height.max(1);
    let target = ratio.as_f64();

    // Integer comparison of width/height > num/den avoids float edge cases
    let wider = width as u64 * ratio.den as u64 > height as u64 * ratio.num as u64;

    if wider {
        let crop_w = ((height as f64 * target).round() as u32).clamp(1, width);
        CropRect {
            x: (width - crop_w) / 2,
            y: 0,
            width: crop_w,
            height,
        }
    } else {
        let crop_h = ((width as f64 / target).round() as u32).clamp(1, height);
        CropRect {
            x: 0,
            y: (height - crop_h) / 2,
            width,
            height: crop_h,
        }
    }
}

/// Crop a raster to the target ratio
///
/// With `mirror` set the crop is flipped horizontally, matching what a
/// front-facing preview showed. Callers must pass `false` for external
/// cameras and for uploaded files.
pub fn crop_to_ratio(
    image: &RgbaImage,
    ratio: AspectRatio,
    mirror: bool,
    canvas: OutputCanvas,
) -> RgbaImage {
    let rect = crop_rect(image.width(), image.height(), ratio);
    debug!(
        src_width = image.width(),
        src_height = image.height(),
        x = rect.x,
        y = rect.y,
        width = rect.width,
        height = rect.height,
        mirror,
        "Cropping to ratio"
    );

    let mut cropped = imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image();

    if mirror {
        imageops::flip_horizontal_in_place(&mut cropped);
    }

    match canvas {
        OutputCanvas::Source => cropped,
        OutputCanvas::Fixed { width, height } => {
            imageops::resize(&cropped, width, height, FilterType::Lanczos3)
        }
    }
}
