use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LuckyError, Result};
use crate::frame::{Binning, Frame};
use crate::io::adv::{AdvReader, AdvWriter, ADV_MAGIC};
use crate::io::fits::FitsReader;
use crate::io::fits_cube::FitsCubeWriter;
use crate::io::fits_frame::FitsFrameWriter;
use crate::io::ser::{SerByteOrder, SerHeader, SerReader, SER_MAGIC};
use crate::io::ser_writer::SerWriter;
use crate::io::timestamp::from_filetime;

/// Output format of a capture run. Chosen once per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SaveFormat {
    /// One FITS file per frame.
    Fits,
    #[default]
    Ser,
    Adv,
    FitsCube,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Fits => "fits",
            Self::Ser => "ser",
            Self::Adv => "adv",
            Self::FitsCube => "cube.fits",
        }
    }

    /// `<dir>/<stem>_run<NNN>.<ext>`
    pub fn container_path(self, dir: &Path, stem: &str, run_id: u32) -> PathBuf {
        dir.join(format!("{stem}_run{run_id:03}.{}", self.extension()))
    }
}

impl fmt::Display for SaveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fits => "fits",
            Self::Ser => "ser",
            Self::Adv => "adv",
            Self::FitsCube => "fits-cube",
        };
        f.write_str(name)
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fits" => Ok(Self::Fits),
            "ser" => Ok(Self::Ser),
            "adv" => Ok(Self::Adv),
            "fits-cube" | "fitscube" | "cube" => Ok(Self::FitsCube),
            other => Err(format!("unknown save format '{other}' (fits, ser, adv, fits-cube)")),
        }
    }
}

/// Everything a writer needs to lay out its header before the first frame.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub width: u32,
    pub height: u32,
    pub binning: Binning,
    /// ROI origin on the full sensor.
    pub origin: (u32, u32),
    pub start_time: DateTime<Utc>,
    pub exposure_seconds: f64,
    /// Frame count the run aims for; provisional header value for FITS cubes.
    pub declared_frames: u32,
    pub run_id: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub ser_byte_order: SerByteOrder,
}

impl ContainerSpec {
    pub fn new(width: u32, height: u32, start_time: DateTime<Utc>) -> Self {
        Self {
            width,
            height,
            binning: Binning::default(),
            origin: (0, 0),
            start_time,
            exposure_seconds: 0.0,
            declared_frames: 0,
            run_id: 0,
            observer: String::new(),
            instrument: String::new(),
            telescope: String::new(),
            ser_byte_order: SerByteOrder::default(),
        }
    }

    /// Sized from the first frame of a run.
    pub fn for_frame(frame: &Frame) -> Self {
        let mut spec = Self::new(frame.width(), frame.height(), frame.exposure_start);
        spec.exposure_seconds = frame.exposure_seconds;
        spec
    }
}

/// Where a writer is in its `Created -> add_frame* -> Closed` lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterState {
    Open,
    Closed,
    /// `close` started but did not finish; the file is not finalized.
    Failed,
}

impl WriterState {
    /// Gate for `close`: `Ok(true)` when there is work to do.
    pub fn begin_close(&mut self, what: &str) -> Result<bool> {
        match self {
            WriterState::Open => {
                *self = WriterState::Failed;
                Ok(true)
            }
            WriterState::Closed => Ok(false),
            WriterState::Failed => Err(LuckyError::InvalidState(format!(
                "{what} failed to close earlier and is not finalized"
            ))),
        }
    }
}

/// A streaming container file: `Created -> add_frame* -> Closed`.
///
/// `add_frame` after `close` fails with `InvalidState`; a second `close` is a
/// no-op, unless the first one failed, in which case it fails with
/// `InvalidState`. Writers are not shared between threads; frames arrive in
/// order.
pub trait ContainerWriter: Send {
    fn add_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Patch deferred header fields and append the trailer.
    fn close(&mut self) -> Result<()>;

    fn frames_written(&self) -> u32;

    fn path(&self) -> &Path;

    fn format(&self) -> SaveFormat;
}

/// Open the writer for `format` at `path`.
pub fn open_container(
    format: SaveFormat,
    path: &Path,
    spec: &ContainerSpec,
) -> Result<Box<dyn ContainerWriter>> {
    if spec.width == 0 || spec.height == 0 {
        return Err(LuckyError::InvalidDimensions {
            width: spec.width,
            height: spec.height,
        });
    }
    let writer: Box<dyn ContainerWriter> = match format {
        SaveFormat::Ser => Box::new(SerWriter::create(
            path,
            &SerHeader::for_capture(spec, spec.ser_byte_order),
        )?),
        SaveFormat::Adv => Box::new(AdvWriter::create(path, spec)?),
        SaveFormat::FitsCube => Box::new(FitsCubeWriter::create(path, spec)?),
        SaveFormat::Fits => Box::new(FitsFrameWriter::create(path, spec)?),
    };
    Ok(writer)
}

/// Header summary of a container on disk.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ContainerSummary {
    pub format: SaveFormat,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    pub start_time: Option<DateTime<Utc>>,
    /// Per-frame timestamps found in the trailer.
    pub timestamps: usize,
}

/// Identify a container by its magic bytes and summarize its header.
pub fn inspect(path: &Path) -> Result<ContainerSummary> {
    let mut magic = [0u8; 14];
    let n = std::fs::File::open(path)?.read(&mut magic)?;
    let magic = &magic[..n];

    if magic.starts_with(SER_MAGIC) {
        let reader = SerReader::open(path)?;
        Ok(ContainerSummary {
            format: SaveFormat::Ser,
            width: reader.header.width,
            height: reader.header.height,
            frame_count: reader.frame_count(),
            start_time: reader.header.start_time_utc(),
            timestamps: reader.timestamps().len(),
        })
    } else if magic.starts_with(ADV_MAGIC) {
        let reader = AdvReader::open(path)?;
        Ok(ContainerSummary {
            format: SaveFormat::Adv,
            width: reader.image.width,
            height: reader.image.height,
            frame_count: reader.frame_count as usize,
            start_time: from_filetime(reader.start_time),
            timestamps: reader.timestamps().len(),
        })
    } else if magic.starts_with(b"SIMPLE") {
        let reader = FitsReader::open(path)?;
        let format = if reader.header.integer("NAXIS") == Some(3) {
            SaveFormat::FitsCube
        } else {
            SaveFormat::Fits
        };
        Ok(ContainerSummary {
            format,
            width: reader.width(),
            height: reader.height(),
            frame_count: reader.frame_count(),
            start_time: reader.date_obs(),
            timestamps: 0,
        })
    } else {
        Err(LuckyError::InvalidContainer(format!(
            "unrecognized container: {}",
            path.display()
        )))
    }
}

/// Read one frame from any supported container.
pub fn read_frame(path: &Path, index: usize) -> Result<Frame> {
    match inspect(path)?.format {
        SaveFormat::Ser => SerReader::open(path)?.read_frame(index),
        SaveFormat::Adv => AdvReader::open(path)?.read_frame(index),
        SaveFormat::Fits | SaveFormat::FitsCube => FitsReader::open(path)?.read_frame(index),
    }
}
