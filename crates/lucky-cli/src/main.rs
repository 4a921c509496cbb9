mod commands;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lucky", about = "Lucky-imaging capture tool")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a burst of frames into a container file
    Capture(commands::capture::CaptureArgs),
    /// Show SER/ADV/FITS container metadata
    Info(commands::info::InfoArgs),
    /// Compute image statistics for one frame of a container
    Stats(commands::stats::StatsArgs),
    /// Print or save a default capture config
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Capture(args) => commands::capture::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Stats(args) => commands::stats::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
