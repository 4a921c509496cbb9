use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lucky_core::capture::StatisticsConfig;
use lucky_core::frame::Roi;
use lucky_core::io::read_frame;
use lucky_core::stats::{analyze_frame, frame_statistics, CentroidRequest};

use super::capture::parse_size;

#[derive(Args)]
pub struct StatsArgs {
    /// Input SER, ADV or FITS file
    pub file: PathBuf,

    /// Zero-based frame index
    #[arg(short, long, default_value = "0")]
    pub frame: usize,

    /// Locate the object above this pixel value and suggest a ROI
    #[arg(short, long)]
    pub threshold: Option<u16>,

    /// Size of the suggested ROI (WxH); defaults to half the frame
    #[arg(long, value_parser = parse_size)]
    pub roi_size: Option<(u32, u32)>,

    /// Worker threads for the statistics pass (0 = all cores)
    #[arg(short, long, default_value = "0")]
    pub workers: usize,
}

pub fn run(args: &StatsArgs) -> Result<()> {
    let frame = read_frame(&args.file, args.frame).with_context(|| {
        format!("Failed to read frame {} of {}", args.frame, args.file.display())
    })?;

    let config = StatisticsConfig {
        workers: args.workers,
        ..StatisticsConfig::default()
    };

    let (stats, roi) = match args.threshold {
        Some(threshold) => {
            let (w, h) = args
                .roi_size
                .unwrap_or(((frame.width() / 2).max(1), (frame.height() / 2).max(1)));
            let request = CentroidRequest {
                camera_width: frame.width(),
                camera_height: frame.height(),
                threshold,
                seed: Roi::new(0, 0, w.min(frame.width()), h.min(frame.height())),
                bit_depth: config.bit_depth,
                workers: config.workers,
            };
            let analysis = analyze_frame(&frame, &request)?;
            (analysis.statistics, Some(analysis.roi))
        }
        None => (frame_statistics(&frame, &config)?, None),
    };

    println!("Frame:       {} ({}x{})", args.frame, frame.width(), frame.height());
    println!("Mean:        {:.2}", stats.mean);
    println!("Std dev:     {:.2}", stats.stdev);
    println!("Median:      {:.1}", stats.median);
    println!("MAD:         {:.1}", stats.mad);
    println!("Min:         {} (x{})", stats.min, stats.min_occurrences);
    println!("Max:         {} (x{})", stats.max, stats.max_occurrences);

    if let Some(centroid) = stats.centroid {
        if centroid.found {
            println!("Centroid:    {:.1}, {:.1}", centroid.x, centroid.y);
        } else {
            println!("Centroid:    none above threshold");
        }
    }
    if let Some(roi) = roi {
        println!("ROI:         {}", roi);
    }

    Ok(())
}
