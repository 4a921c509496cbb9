use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use lucky_core::capture::sink::{FrameSink, PersistRequest};
use lucky_core::capture::{CaptureConfig, FrameSource, LiveViewRequest};
use lucky_core::error::{LuckyError, Result};
use lucky_core::frame::{Frame, Roi};

/// A whole-second UTC instant so FILETIME and millisecond round-trips are exact.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap()
}

/// Frame whose pixel at (x, y) is `(y * width + x) * step`, wrapping at 16 bits.
pub fn ramp_frame(width: u32, height: u32, step: u16) -> Frame {
    let pixels = (0..width * height)
        .map(|i| (i as u16).wrapping_mul(step))
        .collect();
    Frame::new(width, height, pixels, fixed_time(), 0.01).unwrap()
}

/// Uniform background with a bright square of half-size `radius` at (cx, cy).
pub fn star_frame(width: u32, height: u32, cx: u32, cy: u32, radius: u32) -> Frame {
    let mut pixels = vec![1000u16; (width * height) as usize];
    for y in cy.saturating_sub(radius)..=(cy + radius).min(height - 1) {
        for x in cx.saturating_sub(radius)..=(cx + radius).min(width - 1) {
            pixels[(y * width + x) as usize] = 30000;
        }
    }
    Frame::new(width, height, pixels, fixed_time(), 0.01).unwrap()
}

pub fn flat_frame(width: u32, height: u32, value: u16) -> Frame {
    Frame::new(
        width,
        height,
        vec![value; (width * height) as usize],
        fixed_time(),
        0.01,
    )
    .unwrap()
}

/// A device whose writes always fail with "no space left", when the host has one.
pub fn full_device() -> Option<&'static Path> {
    let path = Path::new("/dev/full");
    path.exists().then_some(path)
}

/// Capture config writing into `dir` with fast reconnect polling and no
/// side outputs.
pub fn test_config(dir: &Path) -> CaptureConfig {
    let mut config = CaptureConfig::default();
    config.output_dir = dir.to_path_buf();
    config.file_stem = "test".into();
    config.roi = Roi::new(0, 0, 32, 24);
    config.total_frames = 5;
    config.reconnect_poll_ms = 1;
    config.save_stats_to_csv = false;
    config.preview_every_nth = 0;
    config.statistics.workers = 2;
    config
}

/// Records the frame numbers handed to it.
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Mutex<Vec<u32>>,
    /// Frame numbers for which `persist` fails.
    pub fail_on: Vec<u32>,
}

impl RecordingSink {
    pub fn recorded(&self) -> Vec<u32> {
        let mut frames = self.frames.lock().unwrap().clone();
        frames.sort_unstable();
        frames
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn persist(&self, request: PersistRequest) -> Result<()> {
        if self.fail_on.contains(&request.frame_number) {
            return Err(LuckyError::ResourceUnavailable("sink full".into()));
        }
        self.frames.lock().unwrap().push(request.frame_number);
        Ok(())
    }
}

/// Replays a fixed list of frames, then ends the stream.
pub struct ScriptedSource {
    pub sensor: (u32, u32),
    pub frames: Vec<Frame>,
    pub requests: Mutex<Vec<LiveViewRequest>>,
    pub subsamples: Mutex<Vec<Roi>>,
}

impl ScriptedSource {
    pub fn new(sensor: (u32, u32), frames: Vec<Frame>) -> Arc<Self> {
        Arc::new(Self {
            sensor,
            frames,
            requests: Mutex::new(Vec::new()),
            subsamples: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    fn sensor_size(&self) -> (u32, u32) {
        self.sensor
    }

    fn live_view(
        &self,
        request: &LiveViewRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Frame>> {
        self.requests.lock().unwrap().push(request.clone());
        stream::iter(self.frames.clone().into_iter().map(Ok))
            .take_until(cancel.cancelled_owned())
            .boxed()
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn set_subsample(&self, roi: Roi) -> Result<()> {
        self.subsamples.lock().unwrap().push(roi);
        Ok(())
    }
}
