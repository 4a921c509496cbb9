use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::container::{ContainerSpec, ContainerWriter, SaveFormat};
use crate::io::fits::{block_padding, encode_samples, CardValue, FitsCard, FitsHeader};

/// Writes every frame to its own FITS file next to `base`:
/// `run_001.fits` becomes `run_001_00001.fits`, `run_001_00002.fits`, ...
pub struct FitsFrameWriter {
    base: PathBuf,
    spec: ContainerSpec,
    written: Vec<PathBuf>,
    closed: bool,
}

impl FitsFrameWriter {
    pub fn create(base: &Path, spec: &ContainerSpec) -> Result<Self> {
        if let Some(dir) = base.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        Ok(Self {
            base: base.to_path_buf(),
            spec: spec.clone(),
            written: Vec::new(),
            closed: false,
        })
    }

    /// Files written so far, in frame order.
    pub fn written_paths(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn frame_path(&self, number: u32) -> PathBuf {
        let stem = self
            .base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "frame".to_string());
        self.base.with_file_name(format!("{stem}_{number:05}.fits"))
    }
}

impl ContainerWriter for FitsFrameWriter {
    fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(LuckyError::InvalidState("FITS frame writer already closed".into()));
        }
        let expected = self.spec.width as usize * self.spec.height as usize;
        if frame.pixel_count() != expected
            || frame.width() != self.spec.width
            || frame.height() != self.spec.height
        {
            return Err(LuckyError::ShapeMismatch {
                expected,
                actual: frame.pixel_count(),
            });
        }

        let number = self.written.len() as u32 + 1;
        let frame_spec = ContainerSpec {
            start_time: frame.exposure_start,
            exposure_seconds: frame.exposure_seconds,
            ..self.spec.clone()
        };
        let mut header = FitsHeader::image(frame.width(), frame.height(), None);
        header.add_capture_metadata(&frame_spec);
        header.add_exposure_dates(frame);
        header.push(FitsCard::new("FRAMENUM", CardValue::Integer(number as i64)));

        let path = self.frame_path(number);
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(&header.encode())?;
        let mut data = vec![0u8; frame.pixel_count() * 2];
        encode_samples(frame.pixels(), &mut data);
        writer.write_all(&data)?;
        writer.write_all(&vec![0u8; block_padding(data.len() as u64)])?;
        writer.flush()?;

        self.written.push(path);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            debug!(
                frames = self.written.len(),
                base = %self.base.display(),
                "FITS frame series closed"
            );
        }
        Ok(())
    }

    fn frames_written(&self) -> u32 {
        self.written.len() as u32
    }

    fn path(&self) -> &Path {
        &self.base
    }

    fn format(&self) -> SaveFormat {
        SaveFormat::Fits
    }
}
