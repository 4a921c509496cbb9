use crate::frame::{Binning, Roi};
use crate::io::SaveFormat;

use super::config::CaptureConfig;

/// State carried from one capture run to the next for a single target.
///
/// The pipeline bumps `run_id` at the start of every run and moves `roi`
/// while tracking; both change only between frames.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: u32,
    pub total_frames: u32,
    pub roi: Roi,
    pub binning: Binning,
    pub save_format: SaveFormat,
}

impl RunContext {
    pub fn new(roi: Roi) -> Self {
        Self {
            roi,
            ..Self::default()
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            run_id: 0,
            total_frames: config.total_frames,
            roi: config.roi,
            binning: config.binning,
            save_format: config.save_format,
        }
    }

    /// Start a new run and return its id. The ROI carries over.
    pub fn begin_run(&mut self, config: &CaptureConfig) -> u32 {
        self.run_id += 1;
        self.total_frames = config.total_frames;
        self.binning = config.binning;
        self.save_format = config.save_format;
        self.run_id
    }
}
