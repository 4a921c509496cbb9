use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::container::{ContainerWriter, SaveFormat, WriterState};
use crate::io::deferred::PatchTable;
use crate::io::ser::{SerHeader, SER_FRAME_COUNT_OFFSET, SER_HEADER_SIZE, SER_MAGIC};
use crate::io::timestamp::to_filetime;

const FRAME_COUNT_FIELD: &str = "FrameCount";

/// Streaming SER writer.
///
/// The header goes out with a zero frame count, frames are appended as they
/// arrive, and `close` writes the FILETIME trailer and patches the count.
pub struct SerWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    header: SerHeader,
    patches: PatchTable,
    timestamps: Vec<u64>,
    scratch: Vec<u8>,
    frames_written: u32,
    state: WriterState,
}

impl SerWriter {
    /// Create a new SER file and write the provisional header.
    pub fn create(path: &Path, header: &SerHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let mut header = header.clone();
        header.frame_count = 0;
        write_header(&mut writer, &header)?;

        let mut patches = PatchTable::new();
        patches.record(FRAME_COUNT_FIELD, SER_FRAME_COUNT_OFFSET);

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            scratch: vec![0u8; header.pixel_count() * 2],
            header,
            patches,
            timestamps: Vec::new(),
            frames_written: 0,
            state: WriterState::Open,
        })
    }

    pub fn header(&self) -> &SerHeader {
        &self.header
    }
}

impl ContainerWriter for SerWriter {
    fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(LuckyError::InvalidState("SER writer already closed".into()));
        }
        let expected = self.header.pixel_count();
        if frame.pixel_count() != expected
            || frame.width() != self.header.width
            || frame.height() != self.header.height
        {
            return Err(LuckyError::ShapeMismatch {
                expected,
                actual: frame.pixel_count(),
            });
        }

        self.header
            .byte_order
            .encode(frame.pixels(), &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.timestamps.push(to_filetime(frame.exposure_start));
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.state.begin_close("SER writer")? {
            return Ok(());
        }

        // Trailer: one FILETIME per frame, directly after the last frame.
        for &ts in &self.timestamps {
            self.writer.write_u64::<LittleEndian>(ts)?;
        }

        self.header.frame_count = self.frames_written;
        self.patches.patch(
            &mut self.writer,
            FRAME_COUNT_FIELD,
            &(self.frames_written as i32).to_le_bytes(),
        )?;
        self.writer.flush()?;
        self.state = WriterState::Closed;

        debug!(
            frames = self.frames_written,
            path = %self.path.display(),
            "SER file closed"
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
        SaveFormat::Ser
    }
}

fn write_header(w: &mut impl Write, header: &SerHeader) -> Result<()> {
    // Magic (14 bytes)
    w.write_all(SER_MAGIC)?;
    // LuID (4 bytes)
    w.write_i32::<LittleEndian>(0)?;
    // ColorID (4 bytes)
    w.write_i32::<LittleEndian>(header.color_id)?;
    // Endianness flag (4 bytes)
    w.write_i32::<LittleEndian>(header.byte_order.flag())?;
    // Width (4 bytes)
    w.write_i32::<LittleEndian>(header.width as i32)?;
    // Height (4 bytes)
    w.write_i32::<LittleEndian>(header.height as i32)?;
    // PixelDepth (4 bytes)
    w.write_i32::<LittleEndian>(header.pixel_depth as i32)?;
    // FrameCount (4 bytes)
    w.write_i32::<LittleEndian>(header.frame_count as i32)?;
    // Observer (40 bytes)
    write_fixed_string(w, &header.observer, 40)?;
    // Instrument (40 bytes)
    write_fixed_string(w, &header.instrument, 40)?;
    // Telescope (40 bytes)
    write_fixed_string(w, &header.telescope, 40)?;
    // DateTime (8 bytes)
    w.write_u64::<LittleEndian>(header.date_time)?;
    // DateTimeUTC (8 bytes)
    w.write_u64::<LittleEndian>(header.date_time_utc)?;

    debug_assert_eq!(
        14 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 40 + 40 + 40 + 8 + 8,
        SER_HEADER_SIZE
    );
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let mut field = vec![0u8; len];
    let bytes = s.as_bytes();
    let n = bytes.len().min(len);
    field[..n].copy_from_slice(&bytes[..n]);
    w.write_all(&field)?;
    Ok(())
}
