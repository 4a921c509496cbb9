use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::preview::save_preview_png;
use crate::stats::{frame_statistics, Statistics};

use super::config::StatisticsConfig;

/// A finished frame handed to the host for display or cataloguing.
#[derive(Clone, Debug)]
pub struct PersistRequest {
    pub run_id: u32,
    /// 1-based position in the run.
    pub frame_number: u32,
    pub total_frames: u32,
    pub frame: Arc<Frame>,
    pub statistics: Option<Statistics>,
}

#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn persist(&self, request: PersistRequest) -> Result<()>;
}

/// Discards everything.
pub struct NullSink;

#[async_trait]
impl FrameSink for NullSink {
    async fn persist(&self, _request: PersistRequest) -> Result<()> {
        Ok(())
    }
}

/// Writes a stretched PNG per request into `dir`.
pub struct PreviewSink {
    dir: PathBuf,
    statistics: StatisticsConfig,
}

impl PreviewSink {
    pub fn new(dir: PathBuf, statistics: StatisticsConfig) -> Self {
        Self { dir, statistics }
    }

    pub fn preview_path(&self, run_id: u32, frame_number: u32) -> PathBuf {
        self.dir
            .join(format!("preview_run{run_id:03}_{frame_number:05}.png"))
    }
}

#[async_trait]
impl FrameSink for PreviewSink {
    async fn persist(&self, request: PersistRequest) -> Result<()> {
        let path = self.preview_path(request.run_id, request.frame_number);
        let dir = self.dir.clone();
        let config = self.statistics.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let stats = match request.statistics {
                Some(stats) => stats,
                None => frame_statistics(&request.frame, &config)?,
            };
            save_preview_png(&request.frame, &stats, &path)?;
            debug!(path = %path.display(), "Preview written");
            Ok(())
        })
        .await
        .map_err(|e| LuckyError::ResourceUnavailable(format!("preview task failed: {e}")))?
    }
}
