use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consts::WARMUP_EXPOSURE_SECONDS;
use crate::error::Result;
use crate::frame::{Frame, Roi};
use crate::io::{open_container, ContainerSpec, ContainerWriter, SaveFormat};
use crate::stats::{analyze_frame, frame_statistics, CentroidRequest};

use super::config::CaptureConfig;
use super::context::RunContext;
use super::frame_log::FrameLog;
use super::memory::{MemoryProbe, SystemMemoryProbe};
use super::persist::PersistQueue;
use super::progress::{NoOpReporter, ProgressReporter};
use super::reconnect::wait_for_reconnect;
use super::sink::{FrameSink, NullSink, PersistRequest};
use super::source::{FrameSource, LiveViewRequest};

/// Outcome of one capture run.
#[derive(Clone, Debug)]
pub struct CaptureReport {
    pub run_id: u32,
    pub format: SaveFormat,
    pub container_path: Option<PathBuf>,
    /// Frames counted toward the target (written, dropped, filtered or skipped).
    pub frames_counted: u32,
    pub frames_written: u32,
    /// Dropped by the memory check.
    pub frames_dropped: u32,
    /// Rejected by the statistics filter.
    pub frames_filtered: u32,
    /// Dimensions did not match the open container.
    pub frames_skipped: u32,
    pub elapsed: Duration,
    pub fps: f64,
    pub frame_log_path: Option<PathBuf>,
    pub persisted_frames: usize,
    /// Ended before the target: cancelled, stream ended or a write failed.
    pub aborted: bool,
    /// ROI at the end of the run.
    pub roi: Roi,
}

enum Flow {
    Continue,
    Stop,
}

struct RunState {
    run_id: u32,
    total: u32,
    writer: Option<Box<dyn ContainerWriter>>,
    dims: (u32, u32),
    first_frame_seen: bool,
    counted: u32,
    dropped: u32,
    filtered: u32,
    skipped: u32,
    started: Option<Instant>,
    last_refresh: Option<Instant>,
    frame_log: FrameLog,
    queue: PersistQueue,
    /// Sink calls still running, keyed by frame number.
    in_flight: JoinSet<(u32, Result<()>)>,
    persisted: usize,
    aborted: bool,
}

impl RunState {
    fn new(run_id: u32, total: u32) -> Self {
        Self {
            run_id,
            total,
            writer: None,
            dims: (0, 0),
            first_frame_seen: false,
            counted: 0,
            dropped: 0,
            filtered: 0,
            skipped: 0,
            started: None,
            last_refresh: None,
            frame_log: FrameLog::default(),
            queue: PersistQueue::new(),
            in_flight: JoinSet::new(),
            persisted: 0,
            aborted: false,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.map(|t| t.elapsed()).unwrap_or_default()
    }
}

/// Drives one live-view stream into one container file.
pub struct CapturePipeline {
    config: CaptureConfig,
    source: Arc<dyn FrameSource>,
    memory: Arc<dyn MemoryProbe>,
    sink: Arc<dyn FrameSink>,
    reporter: Arc<dyn ProgressReporter>,
}

impl CapturePipeline {
    pub fn new(config: CaptureConfig, source: Arc<dyn FrameSource>) -> Self {
        Self {
            config,
            source,
            memory: Arc::new(SystemMemoryProbe::new()),
            sink: Arc::new(NullSink),
            reporter: Arc::new(NoOpReporter),
        }
    }

    pub fn with_memory_probe(mut self, memory: Arc<dyn MemoryProbe>) -> Self {
        self.memory = memory;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Run one capture.
    ///
    /// The container is closed on every exit path, including cancellation
    /// through `cancel`. Write failures end the run early and are reported
    /// through `CaptureReport::aborted`; only a failed close is an error.
    pub async fn run(
        &self,
        ctx: &mut RunContext,
        cancel: CancellationToken,
    ) -> Result<CaptureReport> {
        self.config.validate()?;
        let run_id = ctx.begin_run(&self.config);
        let total = ctx.total_frames;
        std::fs::create_dir_all(&self.config.output_dir)?;

        info!(
            run = run_id,
            frames = total,
            format = %ctx.save_format,
            exposure = self.config.exposure_seconds,
            roi = %ctx.roi,
            "Starting capture run"
        );
        self.reporter.begin(run_id, total);

        let run_token = cancel.child_token();
        let request = LiveViewRequest {
            exposure_seconds: self.config.exposure_seconds,
            binning: self.config.binning,
            subsample: self.config.camera_subsample().then_some(ctx.roi),
        };
        let mut stream = self.source.live_view(&request, run_token.clone());
        let mut state = RunState::new(run_id, total);

        self.consume(&mut stream, ctx, &mut state, &cancel, &run_token)
            .await;
        run_token.cancel();
        drop(stream);
        let elapsed = state.elapsed();

        let close_result = match state.writer.as_mut() {
            Some(writer) => writer.close(),
            None => Ok(()),
        };
        if state.counted < total {
            state.aborted = true;
        }

        while let Some(joined) = state.in_flight.join_next().await {
            match joined {
                Ok((_, Ok(()))) => state.persisted += 1,
                Ok((frame, Err(e))) => warn!(frame, error = %e, "Failed to persist frame"),
                Err(e) => warn!(error = %e, "Persistence task panicked"),
            }
        }

        let queue = std::mem::take(&mut state.queue);
        if !queue.is_empty() {
            debug!(jobs = queue.len(), "Draining persistence queue");
            let outcome = queue
                .drain(Arc::clone(&self.sink), self.config.persist_workers)
                .await;
            state.persisted += outcome.completed;
        }

        let poll = Duration::from_millis(self.config.reconnect_poll_ms);
        if let Err(e) = wait_for_reconnect(self.source.as_ref(), poll, &cancel).await {
            warn!(error = %e, "Stopped waiting for the camera to reconnect");
            state.aborted = true;
        }

        let frame_log_path = if self.config.save_stats_to_csv {
            match state
                .frame_log
                .write(&self.config.output_dir, run_id, Local::now())
            {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(error = %e, "Failed to write frame log");
                    None
                }
            }
        } else {
            None
        };

        self.reporter.finish();
        close_result?;

        let frames_written = state.writer.as_ref().map_or(0, |w| w.frames_written());
        let report = CaptureReport {
            run_id,
            format: ctx.save_format,
            container_path: state.writer.as_ref().map(|w| w.path().to_path_buf()),
            frames_counted: state.counted,
            frames_written,
            frames_dropped: state.dropped,
            frames_filtered: state.filtered,
            frames_skipped: state.skipped,
            elapsed,
            fps: fps(state.counted, elapsed),
            frame_log_path,
            persisted_frames: state.persisted,
            aborted: state.aborted,
            roi: ctx.roi,
        };
        info!(
            run = run_id,
            written = report.frames_written,
            dropped = report.frames_dropped,
            filtered = report.frames_filtered,
            skipped = report.frames_skipped,
            aborted = report.aborted,
            "Capture run finished"
        );
        Ok(report)
    }

    async fn consume(
        &self,
        stream: &mut BoxStream<'static, Result<Frame>>,
        ctx: &mut RunContext,
        state: &mut RunState,
        cancel: &CancellationToken,
        run_token: &CancellationToken,
    ) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(run = state.run_id, frames = state.counted, "Capture cancelled");
                    break;
                }
                _ = run_token.cancelled() => break,
                item = stream.next() => item,
            };
            let Some(item) = item else {
                debug!(frames = state.counted, "Live view ended");
                break;
            };
            let frame = match item {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "Camera stream failed");
                    break;
                }
            };
            if let Flow::Stop = self.handle_frame(frame, ctx, state).await {
                run_token.cancel();
                break;
            }
        }
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Flow {
        if !state.first_frame_seen {
            state.first_frame_seen = true;
            state.started = Some(Instant::now());
            if let Err(e) = self.open_writer(&frame, ctx, state) {
                warn!(error = %e, "Failed to open container");
                state.aborted = true;
                return Flow::Stop;
            }
            if self.config.exposure_seconds < WARMUP_EXPOSURE_SECONDS {
                debug!("Discarding warm-up frame");
                return Flow::Continue;
            }
        }

        let id = state.counted + 1;
        state.counted = id;
        let flow = self.process_frame(id, &frame, ctx, state).await;
        self.reporter.advance(id);

        if matches!(flow, Flow::Continue) && id >= state.total {
            let elapsed = state.elapsed();
            info!(
                frames = id,
                exposure = self.config.exposure_seconds,
                elapsed_ms = elapsed.as_millis() as u64,
                fps = (fps(id, elapsed) * 100.0).round() / 100.0,
                "Capture target reached"
            );
            return Flow::Stop;
        }
        flow
    }

    async fn process_frame(
        &self,
        id: u32,
        frame: &Frame,
        ctx: &mut RunContext,
        state: &mut RunState,
    ) -> Flow {
        if !self.admit() {
            debug!(frame = id, "Available memory below threshold, dropping frame");
            state.dropped += 1;
            return Flow::Continue;
        }

        let fitted = match self.fit_frame(frame, ctx) {
            Ok(f) if (f.width(), f.height()) == state.dims => f,
            Ok(f) => {
                warn!(
                    frame = id,
                    width = f.width(),
                    height = f.height(),
                    "Frame size does not match container, skipping"
                );
                state.skipped += 1;
                return Flow::Continue;
            }
            Err(e) => {
                warn!(frame = id, error = %e, "Frame outside tracking ROI, skipping");
                state.skipped += 1;
                return Flow::Continue;
            }
        };

        let statistics = if self.config.filter.is_enabled() {
            match frame_statistics(&fitted, &self.config.statistics) {
                Ok(stats) => Some(stats),
                Err(e) => {
                    warn!(frame = id, error = %e, "Statistics failed");
                    None
                }
            }
        } else {
            None
        };
        let pinned = id == 1 || id == state.total;
        if let Some(stats) = &statistics {
            if !pinned && !self.config.filter.passes(stats) {
                debug!(frame = id, mean = stats.mean, stdev = stats.stdev, "Frame filtered");
                state.filtered += 1;
                return Flow::Continue;
            }
        }

        let Some(writer) = state.writer.as_mut() else {
            return Flow::Stop;
        };
        if let Err(e) = writer.add_frame(&fitted) {
            warn!(
                frame = id,
                error = %e,
                path = %writer.path().display(),
                "Failed to write frame, ending run"
            );
            state.aborted = true;
            return Flow::Stop;
        }
        if self.config.save_stats_to_csv {
            state.frame_log.record(id, &fitted);
        }

        if self.shows_frame(id, state.total) {
            let request = PersistRequest {
                run_id: state.run_id,
                frame_number: id,
                total_frames: state.total,
                frame: Arc::new(fitted.into_owned().with_index(id)),
                statistics,
            };
            self.persist(request, state);
        }

        if self.config.tracking.follow_target {
            self.refresh_tracking(frame, ctx, state).await;
        }
        Flow::Continue
    }

    fn open_writer(&self, frame: &Frame, ctx: &RunContext, state: &mut RunState) -> Result<()> {
        let fitted = self.fit_frame(frame, ctx)?;
        let mut spec = ContainerSpec::for_frame(&fitted);
        spec.binning = self.config.binning;
        if self.config.camera_subsample() || self.config.tracking.follow_target {
            spec.origin = (ctx.roi.x, ctx.roi.y);
        }
        spec.exposure_seconds = self.config.exposure_seconds;
        spec.declared_frames = state.total;
        spec.run_id = state.run_id;
        spec.observer = self.config.observer.clone();
        spec.instrument = self.config.instrument.clone();
        spec.telescope = self.config.telescope.clone();
        spec.ser_byte_order = self.config.ser_byte_order;

        let path = ctx.save_format.container_path(
            &self.config.output_dir,
            &self.config.file_stem,
            state.run_id,
        );
        let writer = open_container(ctx.save_format, &path, &spec)?;
        info!(
            path = %path.display(),
            width = spec.width,
            height = spec.height,
            "Opened container"
        );
        state.dims = (spec.width, spec.height);
        state.writer = Some(writer);
        Ok(())
    }

    /// Full-sensor frames are cropped to the tracked ROI while following.
    fn fit_frame<'a>(&self, frame: &'a Frame, ctx: &RunContext) -> Result<Cow<'a, Frame>> {
        if !self.config.tracking.follow_target {
            return Ok(Cow::Borrowed(frame));
        }
        let (bx, by) = self.binning();
        let (sw, sh) = self.source.sensor_size();
        if frame.width() == sw / bx && frame.height() == sh / by {
            Ok(Cow::Owned(frame.crop(&scale_down(ctx.roi, bx, by))?))
        } else {
            Ok(Cow::Borrowed(frame))
        }
    }

    /// A failing probe never drops a frame.
    fn admit(&self) -> bool {
        let threshold = self.config.min_available_memory_mb;
        if threshold <= 0.0 {
            return true;
        }
        match self.memory.available_mb() {
            Ok(available) => available >= threshold,
            Err(e) => {
                debug!(error = %e, "Memory probe unavailable");
                true
            }
        }
    }

    fn shows_frame(&self, id: u32, total: u32) -> bool {
        let nth = self.config.preview_every_nth;
        id == 1 || id == total || (nth > 0 && id % nth == 0)
    }

    /// Hands the frame to the sink without waiting for it.
    fn persist(&self, request: PersistRequest, state: &mut RunState) {
        if self.config.save_to_memory {
            state.queue.push(request);
            return;
        }
        let sink = Arc::clone(&self.sink);
        let frame_number = request.frame_number;
        state
            .in_flight
            .spawn(async move { (frame_number, sink.persist(request).await) });
    }

    async fn refresh_tracking(&self, frame: &Frame, ctx: &mut RunContext, state: &mut RunState) {
        let interval = Duration::from_millis(self.config.tracking.refresh_interval_ms);
        if state.last_refresh.is_some_and(|t| t.elapsed() < interval) {
            return;
        }
        state.last_refresh = Some(Instant::now());

        let (bx, by) = self.binning();
        let (sw, sh) = self.source.sensor_size();
        let request = CentroidRequest {
            camera_width: sw / bx,
            camera_height: sh / by,
            threshold: self.config.tracking.target_pixel_threshold,
            seed: scale_down(ctx.roi, bx, by),
            bit_depth: self.config.statistics.bit_depth,
            workers: self.config.statistics.workers,
        };
        let analysis = match analyze_frame(frame, &request) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!(error = %e, "Centroid analysis failed");
                return;
            }
        };
        if !analysis.object_found() {
            debug!("No pixels above target threshold, keeping ROI");
            return;
        }

        let roi = Roi::new(
            (analysis.roi.x * bx).min(sw.saturating_sub(ctx.roi.width)),
            (analysis.roi.y * by).min(sh.saturating_sub(ctx.roi.height)),
            ctx.roi.width,
            ctx.roi.height,
        );
        if roi == ctx.roi {
            return;
        }
        debug!(from = %ctx.roi, to = %roi, "Recentering ROI on target");
        ctx.roi = roi;
        if let Err(e) = self.source.set_subsample(roi).await {
            warn!(error = %e, "Failed to move camera sub-frame");
        }
    }

    fn binning(&self) -> (u32, u32) {
        (self.config.binning.x.max(1), self.config.binning.y.max(1))
    }
}

fn scale_down(roi: Roi, bx: u32, by: u32) -> Roi {
    Roi::new(roi.x / bx, roi.y / by, roi.width / bx, roi.height / by)
}

fn fps(frames: u32, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        0.0
    }
}
