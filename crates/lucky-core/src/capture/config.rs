use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_PREVIEW_EVERY_NTH, DEFAULT_RECONNECT_POLL_MS, DEFAULT_ROI_REFRESH_MS,
    DEFAULT_TARGET_PIXEL_THRESHOLD, SAMPLE_BITS,
};
use crate::error::{LuckyError, Result};
use crate::frame::{Binning, Roi};
use crate::io::ser::SerByteOrder;
use crate::io::SaveFormat;
use crate::stats::Statistics;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub exposure_seconds: f64,
    pub total_frames: u32,
    pub save_format: SaveFormat,
    pub ser_byte_order: SerByteOrder,
    /// Initial region of interest in full-sensor pixels.
    pub roi: Roi,
    pub binning: Binning,
    /// Ask the camera to sub-sample to the ROI.
    pub enable_subsample: bool,
    pub output_dir: PathBuf,
    pub file_stem: String,
    /// Frames are dropped while available memory is below this. 0 disables the check.
    pub min_available_memory_mb: f64,
    pub save_stats_to_csv: bool,
    /// Queue sink persistence and fan it out after the run.
    pub save_to_memory: bool,
    /// Workers draining the persistence queue (0 = one per core).
    pub persist_workers: usize,
    /// First, last and every Nth frame go to the sink.
    pub preview_every_nth: u32,
    pub reconnect_poll_ms: u64,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub tracking: TrackingConfig,
    pub filter: FilterConfig,
    pub statistics: StatisticsConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            exposure_seconds: 0.01,
            total_frames: 1000,
            save_format: SaveFormat::default(),
            ser_byte_order: SerByteOrder::default(),
            roi: Roi::default(),
            binning: Binning::default(),
            enable_subsample: true,
            output_dir: PathBuf::from("captures"),
            file_stem: "lucky".to_string(),
            min_available_memory_mb: 0.0,
            save_stats_to_csv: true,
            save_to_memory: false,
            persist_workers: 0,
            preview_every_nth: DEFAULT_PREVIEW_EVERY_NTH,
            reconnect_poll_ms: DEFAULT_RECONNECT_POLL_MS,
            observer: String::new(),
            instrument: String::new(),
            telescope: String::new(),
            tracking: TrackingConfig::default(),
            filter: FilterConfig::default(),
            statistics: StatisticsConfig::default(),
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.total_frames == 0 {
            return Err(LuckyError::InvalidState("total_frames must be at least 1".into()));
        }
        if !(self.exposure_seconds >= 0.0) {
            return Err(LuckyError::InvalidState(format!(
                "exposure_seconds must be non-negative, got {}",
                self.exposure_seconds
            )));
        }
        if self.roi.width == 0 || self.roi.height == 0 {
            return Err(LuckyError::InvalidDimensions {
                width: self.roi.width,
                height: self.roi.height,
            });
        }
        if self.binning.x == 0 || self.binning.y == 0 {
            return Err(LuckyError::InvalidState("binning must be at least 1x1".into()));
        }
        Ok(())
    }

    /// Camera-side sub-sampling is off while the ROI follows the target.
    pub fn camera_subsample(&self) -> bool {
        self.enable_subsample && !self.tracking.follow_target
    }
}

/// Centroid-driven ROI recentering.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub follow_target: bool,
    /// Pixels strictly above this value count toward the centroid.
    pub target_pixel_threshold: u16,
    pub refresh_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            follow_target: false,
            target_pixel_threshold: DEFAULT_TARGET_PIXEL_THRESHOLD,
            refresh_interval_ms: DEFAULT_ROI_REFRESH_MS,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Reject frames brighter than this on average (clouds, twilight).
    pub max_mean: Option<f64>,
    /// Reject frames flatter than this (lost target, closed shutter).
    pub min_stdev: Option<f64>,
}

impl FilterConfig {
    pub fn is_enabled(&self) -> bool {
        self.max_mean.is_some() || self.min_stdev.is_some()
    }

    pub fn passes(&self, stats: &Statistics) -> bool {
        let mean_ok = self.max_mean.map_or(true, |max| stats.mean <= max);
        let stdev_ok = self.min_stdev.map_or(true, |min| stats.stdev >= min);
        mean_ok && stdev_ok
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    pub bit_depth: u32,
    /// Worker count for the parallel pass (0 = rayon pool size).
    pub workers: usize,
    pub keep_histogram: bool,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            bit_depth: SAMPLE_BITS,
            workers: 0,
            keep_histogram: false,
        }
    }
}
