use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{LuckyError, Result};
use crate::frame::{Frame, Roi};

use super::source::{FrameSource, LiveViewRequest};

/// Deterministic camera: a bright square star drifting over a noisy sky.
pub struct SyntheticCamera {
    sensor_width: u32,
    sensor_height: u32,
    pub background: u16,
    pub noise: u16,
    pub star_peak: u16,
    /// Half-size of the star square in pixels.
    pub star_radius: u32,
    /// Star center at frame 0, full-sensor pixels.
    pub star_start: (f64, f64),
    /// Star motion per frame.
    pub drift: (f64, f64),
    /// Delay between frames; zero delivers as fast as polled.
    pub frame_interval: Duration,
    /// End the stream after this many frames.
    pub frame_limit: Option<u32>,
    pub start_time: DateTime<Utc>,
    subsample: Arc<Mutex<Option<Roi>>>,
    disconnected_polls: AtomicU32,
}

impl SyntheticCamera {
    pub fn new(sensor_width: u32, sensor_height: u32) -> Self {
        Self {
            sensor_width,
            sensor_height,
            background: 1000,
            noise: 40,
            star_peak: 30000,
            star_radius: 2,
            star_start: (sensor_width as f64 / 2.0, sensor_height as f64 / 2.0),
            drift: (0.0, 0.0),
            frame_interval: Duration::ZERO,
            frame_limit: None,
            start_time: Utc::now(),
            subsample: Arc::new(Mutex::new(None)),
            disconnected_polls: AtomicU32::new(0),
        }
    }

    /// Report disconnected for the next `polls` connection checks.
    pub fn disconnect_for(&self, polls: u32) {
        self.disconnected_polls.store(polls, Ordering::SeqCst);
    }

    pub fn current_subsample(&self) -> Option<Roi> {
        self.subsample.lock().ok().and_then(|roi| *roi)
    }
}

#[async_trait]
impl FrameSource for SyntheticCamera {
    fn sensor_size(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }

    fn live_view(
        &self,
        request: &LiveViewRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Frame>> {
        if let Ok(mut roi) = self.subsample.lock() {
            *roi = request.subsample;
        }
        let scene = Scene {
            sensor: (self.sensor_width, self.sensor_height),
            background: self.background,
            noise: self.noise,
            star_peak: self.star_peak,
            star_radius: self.star_radius,
            star_start: self.star_start,
            drift: self.drift,
            exposure_seconds: request.exposure_seconds,
            binning: (request.binning.x.max(1), request.binning.y.max(1)),
            start_time: self.start_time,
            subsample: Arc::clone(&self.subsample),
        };
        let interval = self.frame_interval;
        let limit = self.frame_limit;

        stream::unfold(0u32, move |n| {
            let scene = scene.clone();
            async move {
                if limit.is_some_and(|limit| n >= limit) {
                    return None;
                }
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                Some((scene.render(n), n + 1))
            }
        })
        .take_until(cancel.cancelled_owned())
        .boxed()
    }

    async fn is_connected(&self) -> bool {
        self.disconnected_polls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    async fn set_subsample(&self, roi: Roi) -> Result<()> {
        if roi.x + roi.width > self.sensor_width || roi.y + roi.height > self.sensor_height {
            return Err(LuckyError::InvalidDimensions {
                width: roi.width,
                height: roi.height,
            });
        }
        let mut current = self
            .subsample
            .lock()
            .map_err(|_| LuckyError::FrameSource("subsample lock poisoned".into()))?;
        if current.is_some() {
            *current = Some(roi);
        }
        Ok(())
    }
}

#[derive(Clone)]
struct Scene {
    sensor: (u32, u32),
    background: u16,
    noise: u16,
    star_peak: u16,
    star_radius: u32,
    star_start: (f64, f64),
    drift: (f64, f64),
    exposure_seconds: f64,
    binning: (u32, u32),
    start_time: DateTime<Utc>,
    subsample: Arc<Mutex<Option<Roi>>>,
}

impl Scene {
    fn render(&self, n: u32) -> Result<Frame> {
        let roi = self
            .subsample
            .lock()
            .map_err(|_| LuckyError::FrameSource("subsample lock poisoned".into()))?
            .unwrap_or(Roi::full(self.sensor.0, self.sensor.1));
        let (bx, by) = self.binning;
        let width = roi.width / bx;
        let height = roi.height / by;

        let cx = self.star_start.0 + self.drift.0 * n as f64;
        let cy = self.star_start.1 + self.drift.1 * n as f64;
        let r = self.star_radius as f64;

        let mut pixels = Vec::with_capacity(width as usize * height as usize);
        for row in 0..height {
            for col in 0..width {
                let sx = (roi.x + col * bx) as f64;
                let sy = (roi.y + row * by) as f64;
                let value = if (sx - cx).abs() <= r && (sy - cy).abs() <= r {
                    self.star_peak
                } else {
                    let jitter = hash(n, sx as u32, sy as u32) % (self.noise as u32 + 1);
                    self.background.saturating_add(jitter as u16)
                };
                pixels.push(value);
            }
        }

        let offset = chrono::Duration::microseconds((self.exposure_seconds * 1e6) as i64);
        let start = self.start_time + offset * n as i32;
        Frame::new(width, height, pixels, start, self.exposure_seconds)
    }
}

fn hash(n: u32, x: u32, y: u32) -> u32 {
    let mut h = n
        .wrapping_mul(0x9E37_79B9)
        ^ x.wrapping_mul(0x85EB_CA6B)
        ^ y.wrapping_mul(0xC2B2_AE35);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h
}
