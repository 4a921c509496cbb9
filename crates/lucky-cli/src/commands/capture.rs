use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use lucky_core::capture::sink::{FrameSink, PreviewSink};
use lucky_core::capture::synthetic::SyntheticCamera;
use lucky_core::capture::{CaptureConfig, CapturePipeline, ProgressReporter, RunContext};
use lucky_core::frame::{Binning, Roi};
use lucky_core::io::ser::SerByteOrder;
use lucky_core::io::SaveFormat;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::summary::{print_capture_report, print_capture_summary};

#[derive(Args)]
pub struct CaptureArgs {
    /// TOML capture config; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Container format: ser, adv, fits, fits-cube
    #[arg(short, long)]
    pub format: Option<SaveFormat>,

    /// Frames per run
    #[arg(short = 'n', long)]
    pub frames: Option<u32>,

    /// Exposure in seconds
    #[arg(short, long)]
    pub exposure: Option<f64>,

    /// Region of interest as X,Y,W,H in sensor pixels
    #[arg(long, value_parser = parse_roi)]
    pub roi: Option<Roi>,

    /// Binning factor (same in X and Y)
    #[arg(short, long)]
    pub binning: Option<u32>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File name stem for containers
    #[arg(long)]
    pub stem: Option<String>,

    /// SER sample byte order
    #[arg(long, value_enum)]
    pub byte_order: Option<ByteOrderArg>,

    /// Re-center the ROI on the brightest object while capturing
    #[arg(long)]
    pub follow: bool,

    /// Pixel value above which a pixel belongs to the target
    #[arg(long)]
    pub threshold: Option<u16>,

    /// Drop frames while available memory is below this many MB
    #[arg(long)]
    pub min_memory: Option<f64>,

    /// Queue preview work and write it after the run
    #[arg(long)]
    pub save_to_memory: bool,

    /// Write PNG previews of the first, last and every Nth frame
    #[arg(long)]
    pub preview: Option<u32>,

    /// Skip the per-frame CSV timing log
    #[arg(long)]
    pub no_csv: bool,

    /// Number of consecutive runs
    #[arg(long, default_value = "1")]
    pub runs: u32,

    /// Simulated sensor size (WxH)
    #[arg(long, default_value = "1280x1024", value_parser = parse_size)]
    pub sensor: (u32, u32),

    /// Simulated target drift per frame as DX,DY pixels
    #[arg(long, value_parser = parse_drift)]
    pub drift: Option<(f64, f64)>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ByteOrderArg {
    Le,
    Be,
}

impl From<ByteOrderArg> for SerByteOrder {
    fn from(arg: ByteOrderArg) -> Self {
        match arg {
            ByteOrderArg::Le => SerByteOrder::LittleEndian,
            ByteOrderArg::Be => SerByteOrder::BigEndian,
        }
    }
}

pub fn run(args: &CaptureArgs) -> Result<()> {
    let config = build_config(args)?;
    let (sensor_w, sensor_h) = args.sensor;
    if config.roi.x + config.roi.width > sensor_w || config.roi.y + config.roi.height > sensor_h {
        bail!(
            "ROI {} does not fit the {}x{} sensor",
            config.roi,
            sensor_w,
            sensor_h
        );
    }

    print_capture_summary(&config, args.sensor, args.runs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(capture(config, args))
}

async fn capture(config: CaptureConfig, args: &CaptureArgs) -> Result<()> {
    let mut camera = SyntheticCamera::new(args.sensor.0, args.sensor.1);
    camera.frame_interval = Duration::from_secs_f64(config.exposure_seconds);
    if let Some(drift) = args.drift {
        camera.drift = drift;
    }

    let bar = ProgressBar::new(u64::from(config.total_frames));
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let mut pipeline = CapturePipeline::new(config.clone(), Arc::new(camera))
        .with_reporter(Arc::new(BarReporter { bar }));
    if args.preview.is_some() {
        let sink: Arc<dyn FrameSink> = Arc::new(PreviewSink::new(
            config.output_dir.join("previews"),
            config.statistics.clone(),
        ));
        pipeline = pipeline.with_sink(sink);
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing the current container");
            on_signal.cancel();
        }
    });

    let mut ctx = RunContext::from_config(&config);
    for _ in 0..args.runs {
        let report = pipeline.run(&mut ctx, cancel.clone()).await?;
        print_capture_report(&report);
        if cancel.is_cancelled() {
            break;
        }
    }
    Ok(())
}

fn build_config(args: &CaptureArgs) -> Result<CaptureConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        }
        None => CaptureConfig::default(),
    };

    if let Some(format) = args.format {
        config.save_format = format;
    }
    if let Some(frames) = args.frames {
        config.total_frames = frames;
    }
    if let Some(exposure) = args.exposure {
        config.exposure_seconds = exposure;
    }
    if let Some(roi) = args.roi {
        config.roi = roi;
    }
    if let Some(b) = args.binning {
        config.binning = Binning { x: b, y: b };
    }
    if let Some(ref dir) = args.output {
        config.output_dir = dir.clone();
    }
    if let Some(ref stem) = args.stem {
        config.file_stem = stem.clone();
    }
    if let Some(order) = args.byte_order {
        config.ser_byte_order = order.into();
    }
    if args.follow {
        config.tracking.follow_target = true;
    }
    if let Some(threshold) = args.threshold {
        config.tracking.target_pixel_threshold = threshold;
    }
    if let Some(mb) = args.min_memory {
        config.min_available_memory_mb = mb;
    }
    if args.save_to_memory {
        config.save_to_memory = true;
    }
    if let Some(nth) = args.preview {
        config.preview_every_nth = nth;
    }
    if args.no_csv {
        config.save_stats_to_csv = false;
    }

    config.validate()?;
    Ok(config)
}

struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn begin(&self, run_id: u32, total_frames: u32) {
        self.bar.reset();
        self.bar.set_length(u64::from(total_frames));
        self.bar.set_message(format!("Run {run_id}"));
    }

    fn advance(&self, frames_done: u32) {
        self.bar.set_position(u64::from(frames_done));
    }

    fn finish(&self) {
        self.bar.finish_with_message("Done");
    }
}

pub fn parse_roi(s: &str) -> Result<Roi, String> {
    let parts: Vec<u32> = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid ROI '{s}': {e}"))?;
    match parts.as_slice() {
        [x, y, w, h] if *w > 0 && *h > 0 => Ok(Roi::new(*x, *y, *w, *h)),
        _ => Err(format!("ROI must be X,Y,W,H with non-zero size, got '{s}'")),
    }
}

pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("size must be WxH, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| format!("invalid width: {e}"))?;
    let h = h.trim().parse::<u32>().map_err(|e| format!("invalid height: {e}"))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero, got '{s}'"));
    }
    Ok((w, h))
}

fn parse_drift(s: &str) -> Result<(f64, f64), String> {
    let (dx, dy) = s
        .split_once(',')
        .ok_or_else(|| format!("drift must be DX,DY, got '{s}'"))?;
    let dx = dx.trim().parse::<f64>().map_err(|e| format!("invalid DX: {e}"))?;
    let dy = dy.trim().parse::<f64>().map_err(|e| format!("invalid DY: {e}"))?;
    Ok((dx, dy))
}
