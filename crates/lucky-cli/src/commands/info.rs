use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lucky_core::io::inspect;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER, ADV or FITS file
    pub file: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let summary = inspect(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    println!("File:        {}", args.file.display());
    println!("Format:      {}", summary.format);
    println!("Frames:      {}", summary.frame_count);
    println!("Dimensions:  {}x{}", summary.width, summary.height);

    if let Some(start) = summary.start_time {
        println!("Start (UTC): {}", start.format("%Y-%m-%d %H:%M:%S%.3f"));
    }
    if summary.timestamps > 0 {
        println!("Timestamps:  {}", summary.timestamps);
    }

    let frame_bytes = summary.width as usize * summary.height as usize * 2;
    let total_mb = (frame_bytes * summary.frame_count) as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    Ok(())
}
