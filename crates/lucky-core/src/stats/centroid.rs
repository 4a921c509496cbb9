//! Object centroid and ROI placement.
//!
//! Extends the parallel statistics pass with a per-pixel threshold test. The
//! unweighted mean position of every pixel brighter than the threshold is the
//! object center; the ROI keeps its size and is re-centered on that point.

use crate::error::{LuckyError, Result};
use crate::frame::{Frame, Roi};

use super::engine::{accumulate_parallel, finish};
use super::{Centroid, Statistics};

/// Statistics plus the ROI derived from the object centroid.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAnalysis {
    pub statistics: Statistics,
    pub roi: Roi,
}

impl ImageAnalysis {
    pub fn object_found(&self) -> bool {
        self.statistics.centroid.is_some_and(|c| c.found)
    }
}

/// Sensor geometry and ROI seed used to place the tracking rectangle.
#[derive(Clone, Copy, Debug)]
pub struct CentroidRequest {
    pub camera_width: u32,
    pub camera_height: u32,
    pub threshold: u16,
    /// Current ROI; its size is kept, its origin offsets cropped frames.
    pub seed: Roi,
    pub bit_depth: u32,
    pub workers: usize,
}

/// Compute statistics and an object-centered ROI for one frame.
///
/// When no pixel exceeds the threshold the full sensor rectangle is returned
/// and the centroid is marked as not found.
pub fn analyze_frame(frame: &Frame, request: &CentroidRequest) -> Result<ImageAnalysis> {
    let pixels = frame.pixels();
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if pixels.len() != width * height {
        return Err(LuckyError::ShapeMismatch {
            expected: width * height,
            actual: pixels.len(),
        });
    }
    if pixels.is_empty() {
        return Err(LuckyError::EmptyFrame);
    }

    let partial = accumulate_parallel(pixels, width, Some(request.threshold), request.workers);
    let mut statistics = finish(pixels.len() as u64, &partial, request.bit_depth);

    if partial.object_count == 0 {
        statistics.centroid = Some(Centroid {
            x: 0.0,
            y: 0.0,
            found: false,
        });
        return Ok(ImageAnalysis {
            statistics,
            roi: Roi::full(request.camera_width, request.camera_height),
        });
    }

    let mut cx = partial.object_sum_x as f64 / partial.object_count as f64;
    let mut cy = partial.object_sum_y as f64 / partial.object_count as f64;

    // A frame smaller than the sensor is a sub-frame read out at the seed origin.
    if frame.width() != request.camera_width || frame.height() != request.camera_height {
        cx += request.seed.x as f64;
        cy += request.seed.y as f64;
    }

    statistics.centroid = Some(Centroid {
        x: cx,
        y: cy,
        found: true,
    });

    let roi = centered_roi(
        cx.floor() as i64,
        cy.floor() as i64,
        request.seed.width,
        request.seed.height,
        request.camera_width,
        request.camera_height,
    );
    Ok(ImageAnalysis { statistics, roi })
}

/// Place a `width`×`height` rectangle centered on (cx, cy), clamped so it stays
/// inside the sensor.
pub fn centered_roi(
    cx: i64,
    cy: i64,
    width: u32,
    height: u32,
    camera_width: u32,
    camera_height: u32,
) -> Roi {
    let width = width.min(camera_width);
    let height = height.min(camera_height);
    let max_x = (camera_width - width) as i64;
    let max_y = (camera_height - height) as i64;
    let x = (cx - width as i64 / 2).clamp(0, max_x);
    let y = (cy - height as i64 / 2).clamp(0, max_y);
    Roi::new(x as u32, y as u32, width, height)
}
