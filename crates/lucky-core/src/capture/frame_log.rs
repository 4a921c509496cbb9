use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::Result;
use crate::frame::Frame;
use crate::io::timestamp::format_millis;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FrameLogRow {
    #[serde(rename = "FrameNumber")]
    pub frame_number: u32,
    #[serde(rename = "DateObs")]
    pub date_obs: String,
    #[serde(rename = "DateMid")]
    pub date_mid: String,
}

/// Exposure timing of every frame written during a run.
#[derive(Clone, Debug, Default)]
pub struct FrameLog {
    rows: Vec<FrameLogRow>,
}

impl FrameLog {
    pub fn record(&mut self, frame_number: u32, frame: &Frame) {
        self.rows.push(FrameLogRow {
            frame_number,
            date_obs: format_millis(frame.exposure_start),
            date_mid: format_millis(frame.exposure_mid()),
        });
    }

    pub fn rows(&self) -> &[FrameLogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `FrameList-<run>-<yyyy-mm-dd HH-MM-SS>.csv`
    pub fn file_name(run_id: u32, at: DateTime<Local>) -> String {
        format!("FrameList-{}-{}.csv", run_id, at.format("%Y-%m-%d %H-%M-%S"))
    }

    pub fn write(&self, dir: &Path, run_id: u32, at: DateTime<Local>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(Self::file_name(run_id, at));
        let mut writer = csv::Writer::from_path(&path)?;
        if self.rows.is_empty() {
            writer.write_record(["FrameNumber", "DateObs", "DateMid"])?;
        }
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(path)
    }
}
