use std::path::Path;

use image::{GrayImage, ImageFormat, Luma};

use crate::consts::{PREVIEW_HIGHLIGHT_MADS, PREVIEW_SHADOW_MADS};
use crate::error::Result;
use crate::frame::Frame;
use crate::stats::Statistics;

/// Black and white points of a median/MAD screen stretch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stretch {
    pub black: f64,
    pub white: f64,
}

impl Stretch {
    pub fn from_statistics(stats: &Statistics) -> Self {
        let spread = if stats.mad > 0.0 { stats.mad } else { stats.stdev.max(1.0) };
        let black = (stats.median - PREVIEW_SHADOW_MADS * spread).max(stats.min as f64);
        let white = (stats.median + PREVIEW_HIGHLIGHT_MADS * spread).min(stats.max as f64);
        if white > black {
            Self { black, white }
        } else {
            Self {
                black: stats.min as f64,
                white: (stats.max as f64).max(stats.min as f64 + 1.0),
            }
        }
    }

    pub fn apply(&self, sample: u16) -> u8 {
        let t = (sample as f64 - self.black) / (self.white - self.black);
        (t.clamp(0.0, 1.0) * 255.0).round() as u8
    }
}

/// Render a frame as an 8-bit stretched grayscale image.
pub fn render_preview(frame: &Frame, stats: &Statistics) -> GrayImage {
    let stretch = Stretch::from_statistics(stats);
    let mut img = GrayImage::new(frame.width(), frame.height());
    for ((row, col), &px) in frame.view().indexed_iter() {
        img.put_pixel(col as u32, row as u32, Luma([stretch.apply(px)]));
    }
    img
}

/// Save a stretched 8-bit PNG preview.
pub fn save_preview_png(frame: &Frame, stats: &Statistics, path: &Path) -> Result<()> {
    render_preview(frame, stats).save_with_format(path, ImageFormat::Png)?;
    Ok(())
}
