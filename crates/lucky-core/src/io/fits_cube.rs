use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::container::{ContainerSpec, ContainerWriter, SaveFormat, WriterState};
use crate::io::deferred::PatchTable;
use crate::io::fits::{block_padding, encode_samples, CardValue, FitsCard, FitsHeader};

/// Streaming writer for a 3-D FITS cube, one plane per frame.
///
/// `NAXIS3` starts at the declared frame count and is patched at close to
/// the number of planes actually written.
pub struct FitsCubeWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header: FitsHeader,
    patches: PatchTable,
    width: u32,
    height: u32,
    data_len: u64,
    scratch: Vec<u8>,
    frames_written: u32,
    state: WriterState,
}

impl FitsCubeWriter {
    pub fn create(path: &Path, spec: &ContainerSpec) -> Result<Self> {
        let mut header = FitsHeader::image(spec.width, spec.height, Some(spec.declared_frames));
        header.add_capture_metadata(spec);

        let mut patches = PatchTable::new();
        if let Some(offset) = header.card_offset("NAXIS3") {
            patches.record("NAXIS3", offset);
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&header.encode())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            header,
            patches,
            width: spec.width,
            height: spec.height,
            data_len: 0,
            scratch: vec![0u8; spec.width as usize * spec.height as usize * 2],
            frames_written: 0,
            state: WriterState::Open,
        })
    }

    pub fn header(&self) -> &FitsHeader {
        &self.header
    }
}

impl ContainerWriter for FitsCubeWriter {
    fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(LuckyError::InvalidState("FITS cube already closed".into()));
        }
        let expected = self.width as usize * self.height as usize;
        if frame.pixel_count() != expected
            || frame.width() != self.width
            || frame.height() != self.height
        {
            return Err(LuckyError::ShapeMismatch {
                expected,
                actual: frame.pixel_count(),
            });
        }

        encode_samples(frame.pixels(), &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.data_len += self.scratch.len() as u64;
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.state.begin_close("FITS cube")? {
            return Ok(());
        }

        let padding = block_padding(self.data_len);
        self.writer.write_all(&vec![0u8; padding])?;

        let card = FitsCard::new("NAXIS3", CardValue::Integer(self.frames_written as i64));
        self.patches
            .patch(&mut self.writer, "NAXIS3", &card.render())?;
        self.writer.flush()?;
        self.state = WriterState::Closed;

        debug!(
            frames = self.frames_written,
            path = %self.path.display(),
            "FITS cube closed"
        );
        Ok(())
    }

    fn frames_written(&self) -> u32 {
        self.frames_written
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn format(&self) -> SaveFormat {
        SaveFormat::FitsCube
    }
}
