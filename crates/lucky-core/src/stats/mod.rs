pub mod centroid;
pub mod engine;
pub mod histogram;

use serde::Serialize;

use crate::capture::config::StatisticsConfig;
use crate::error::Result;
use crate::frame::Frame;

pub use centroid::{analyze_frame, CentroidRequest, ImageAnalysis};
pub use engine::{compute_exact, compute_parallel};
pub use histogram::Histogram;

/// Image statistics of one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Statistics {
    pub bit_depth: u32,
    pub mean: f64,
    pub stdev: f64,
    pub median: f64,
    /// Median absolute deviation.
    pub mad: f64,
    pub min: u16,
    pub min_occurrences: u64,
    pub max: u16,
    pub max_occurrences: u64,
    /// Populated `(value, count)` buckets, kept only on request.
    pub histogram: Option<Vec<(u16, u32)>>,
    pub centroid: Option<Centroid>,
}

/// Object center in full-sensor pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
    pub found: bool,
}

/// Parallel statistics of a frame using the configured worker count.
pub fn frame_statistics(frame: &Frame, config: &StatisticsConfig) -> Result<Statistics> {
    let mut stats = compute_parallel(frame.pixels(), config.bit_depth, config.workers)?;
    if config.keep_histogram {
        stats.histogram = Some(Histogram::from_pixels(frame.pixels()).populated());
    }
    Ok(stats)
}
