use chrono::{DateTime, Duration, Utc};
use ndarray::{s, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{LuckyError, Result};

/// A single raw 16-bit mono frame as delivered by the camera.
///
/// Pixels are row-major, `pixels.len() == width * height`.
#[derive(Clone, Debug)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
    /// Start of the exposure (UTC).
    pub exposure_start: DateTime<Utc>,
    /// Exposure duration in seconds.
    pub exposure_seconds: f64,
    /// Position of the frame within its run (1-based once accepted by the pipeline).
    pub frame_index: u32,
}

impl Frame {
    /// Build a frame, failing fast when the buffer does not match the dimensions.
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u16>,
        exposure_start: DateTime<Utc>,
        exposure_seconds: f64,
    ) -> Result<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(LuckyError::ShapeMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            exposure_start,
            exposure_seconds,
            frame_index: 0,
        })
    }

    pub fn with_index(mut self, frame_index: u32) -> Self {
        self.frame_index = frame_index;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// 2-D view of the pixel buffer, shape = (height, width).
    pub fn view(&self) -> ArrayView2<'_, u16> {
        ArrayView2::from_shape((self.height as usize, self.width as usize), &self.pixels)
            .expect("frame buffer length verified at construction")
    }

    pub fn exposure_mid(&self) -> DateTime<Utc> {
        self.exposure_start + seconds(self.exposure_seconds / 2.0)
    }

    pub fn exposure_end(&self) -> DateTime<Utc> {
        self.exposure_start + seconds(self.exposure_seconds)
    }

    /// Extract a sub-rectangle of this frame.
    pub fn crop(&self, rect: &Roi) -> Result<Frame> {
        if rect.width == 0
            || rect.height == 0
            || rect.x + rect.width > self.width
            || rect.y + rect.height > self.height
        {
            return Err(LuckyError::InvalidDimensions {
                width: rect.width,
                height: rect.height,
            });
        }
        let x0 = rect.x as usize;
        let y0 = rect.y as usize;
        let sub = self.view();
        let sub = sub.slice(s![
            y0..y0 + rect.height as usize,
            x0..x0 + rect.width as usize
        ]);
        let pixels: Vec<u16> = sub.iter().copied().collect();
        Ok(Frame {
            width: rect.width,
            height: rect.height,
            pixels,
            exposure_start: self.exposure_start,
            exposure_seconds: self.exposure_seconds,
            frame_index: self.frame_index,
        })
    }
}

fn seconds(secs: f64) -> Duration {
    Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

/// Region of interest in full-sensor pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole sensor.
    pub fn full(sensor_width: u32, sensor_height: u32) -> Self {
        Self::new(0, 0, sensor_width, sensor_height)
    }

    /// Frame dimensions the camera delivers for this ROI at the given binning.
    pub fn binned(&self, binning: Binning) -> (u32, u32) {
        (
            self.width / binning.x.max(1),
            self.height / binning.y.max(1),
        )
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

impl Default for Roi {
    fn default() -> Self {
        Self::new(0, 0, 1024, 1024)
    }
}

impl std::fmt::Display for Roi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binning {
    pub x: u32,
    pub y: u32,
}

impl Default for Binning {
    fn default() -> Self {
        Self { x: 1, y: 1 }
    }
}
