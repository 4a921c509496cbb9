use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use memmap2::Mmap;
use tracing::debug;

use crate::error::{LuckyError, Result};
use crate::frame::{Binning, Frame};
use crate::io::container::{ContainerSpec, ContainerWriter, SaveFormat, WriterState};
use crate::io::deferred::PatchTable;
use crate::io::timestamp::{from_filetime, to_filetime};

pub const ADV_MAGIC: &[u8; 4] = b"FSTF";
pub const ADV_VERSION: u32 = 2;
/// Section type tag, stored big-endian.
pub const ADV_TLV_TYPE: u16 = 2;

pub const SECTION_MAIN: &str = "MAIN";
pub const SECTION_CALIBRATION: &str = "CALIBRATION";
pub const SECTION_IMAGE: &str = "IMAGE";
pub const SECTION_STATUS: &str = "STATUS";
pub const SECTION_DATA_LAYOUT: &str = "DATA-LAYOUT";
pub const SECTION_COMPRESSION: &str = "SECTION-DATA-COMPRESSION";

pub const DATA_LAYOUT_FULL_RAW: &str = "FULL-IMAGE-RAW";
pub const COMPRESSION_NONE: &str = "UNCOMPRESSED";

const MAIN_COUNT_FIELD: &str = "MAIN.frameCount";

/// Geometry carried by the IMAGE section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdvImageSection {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub binning: Binning,
    pub x_offset: u16,
    pub y_offset: u16,
}

impl AdvImageSection {
    fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(18);
        buf.write_u32::<LittleEndian>(self.width)?;
        buf.write_u32::<LittleEndian>(self.height)?;
        buf.write_u16::<LittleEndian>(self.bits_per_pixel)?;
        buf.write_u16::<LittleEndian>(self.binning.x as u16)?;
        buf.write_u16::<LittleEndian>(self.binning.y as u16)?;
        buf.write_u16::<LittleEndian>(self.x_offset)?;
        buf.write_u16::<LittleEndian>(self.y_offset)?;
        Ok(buf)
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let mut c = Cursor::new(payload);
        let width = c.read_u32::<LittleEndian>()?;
        let height = c.read_u32::<LittleEndian>()?;
        let bits_per_pixel = c.read_u16::<LittleEndian>()?;
        let bin_x = c.read_u16::<LittleEndian>()?;
        let bin_y = c.read_u16::<LittleEndian>()?;
        let x_offset = c.read_u16::<LittleEndian>()?;
        let y_offset = c.read_u16::<LittleEndian>()?;
        Ok(Self {
            width,
            height,
            bits_per_pixel,
            binning: Binning {
                x: bin_x as u32,
                y: bin_y as u32,
            },
            x_offset,
            y_offset,
        })
    }
}

/// Streaming ADV (FSTF v2) writer with TLV header sections.
pub struct AdvWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    image: AdvImageSection,
    patches: PatchTable,
    timestamps: Vec<u64>,
    scratch: Vec<u8>,
    frames_written: u32,
    state: WriterState,
}

impl AdvWriter {
    pub fn create(path: &Path, spec: &ContainerSpec) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let image = AdvImageSection {
            width: spec.width,
            height: spec.height,
            bits_per_pixel: 16,
            binning: spec.binning,
            x_offset: spec.origin.0.min(u16::MAX as u32) as u16,
            y_offset: spec.origin.1.min(u16::MAX as u32) as u16,
        };
        let mut patches = PatchTable::new();
        write_header(&mut writer, &image, spec.start_time, &mut patches)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            scratch: vec![0u8; image.width as usize * image.height as usize * 2],
            image,
            patches,
            timestamps: Vec::new(),
            frames_written: 0,
            state: WriterState::Open,
        })
    }
}

impl ContainerWriter for AdvWriter {
    fn add_frame(&mut self, frame: &Frame) -> Result<()> {
        if self.state != WriterState::Open {
            return Err(LuckyError::InvalidState("ADV writer already closed".into()));
        }
        let expected = self.image.width as usize * self.image.height as usize;
        if frame.pixel_count() != expected
            || frame.width() != self.image.width
            || frame.height() != self.image.height
        {
            return Err(LuckyError::ShapeMismatch {
                expected,
                actual: frame.pixel_count(),
            });
        }

        LittleEndian::write_u16_into(frame.pixels(), &mut self.scratch);
        self.writer.write_all(&self.scratch)?;
        self.timestamps.push(to_filetime(frame.exposure_start));
        self.frames_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.state.begin_close("ADV writer")? {
            return Ok(());
        }

        self.patches.patch(
            &mut self.writer,
            MAIN_COUNT_FIELD,
            &self.frames_written.to_le_bytes(),
        )?;
        for &ts in &self.timestamps {
            self.writer.write_u64::<LittleEndian>(ts)?;
        }
        self.writer.flush()?;
        self.state = WriterState::Closed;

        debug!(
            frames = self.frames_written,
            path = %self.path.display(),
            "ADV file closed"
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
        SaveFormat::Adv
    }
}

fn write_header(
    w: &mut BufWriter<File>,
    image: &AdvImageSection,
    start: DateTime<Utc>,
    patches: &mut PatchTable,
) -> Result<()> {
    w.write_all(ADV_MAGIC)?;
    w.write_u32::<LittleEndian>(ADV_VERSION)?;

    // MAIN: start FILETIME + frame count placeholder
    let mut offset = 8u64;
    offset += write_tlv_header(w, SECTION_MAIN, 12)?;
    w.write_u64::<LittleEndian>(to_filetime(start))?;
    patches.record(MAIN_COUNT_FIELD, offset + 8);
    w.write_u32::<LittleEndian>(0)?;

    write_tlv_header(w, SECTION_CALIBRATION, 0)?;
    write_tlv_section(w, SECTION_IMAGE, &image.encode()?)?;
    write_tlv_header(w, SECTION_STATUS, 0)?;
    write_tlv_section(w, SECTION_DATA_LAYOUT, DATA_LAYOUT_FULL_RAW.as_bytes())?;
    write_tlv_section(w, SECTION_COMPRESSION, COMPRESSION_NONE.as_bytes())?;
    Ok(())
}

/// Returns the number of bytes written.
fn write_tlv_header(w: &mut impl Write, name: &str, payload_len: u32) -> Result<u64> {
    w.write_u16::<BigEndian>(ADV_TLV_TYPE)?;
    w.write_u16::<LittleEndian>(name.len() as u16)?;
    w.write_all(name.as_bytes())?;
    w.write_u32::<LittleEndian>(payload_len)?;
    Ok(2 + 2 + name.len() as u64 + 4)
}

fn write_tlv_section(w: &mut impl Write, name: &str, payload: &[u8]) -> Result<()> {
    write_tlv_header(w, name, payload.len() as u32)?;
    w.write_all(payload)?;
    Ok(())
}

/// One parsed header section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvSection {
    pub section_type: u16,
    pub name: String,
    pub payload: Vec<u8>,
}

/// Memory-mapped ADV reader.
pub struct AdvReader {
    mmap: Mmap,
    pub version: u32,
    pub sections: Vec<AdvSection>,
    pub start_time: u64,
    pub frame_count: u32,
    pub image: AdvImageSection,
    data_offset: usize,
}

impl AdvReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < 8 || &mmap[0..4] != ADV_MAGIC {
            return Err(LuckyError::InvalidContainer("Missing FSTF signature".into()));
        }
        let version = LittleEndian::read_u32(&mmap[4..8]);

        let mut pos = 8usize;
        let mut sections = Vec::new();
        // The header ends after the compression section.
        loop {
            let section = read_section(&mmap, &mut pos)?;
            let done = section.name == SECTION_COMPRESSION;
            sections.push(section);
            if done {
                break;
            }
        }

        let main = find_section(&sections, SECTION_MAIN)?;
        if main.payload.len() < 12 {
            return Err(LuckyError::InvalidContainer("MAIN section too short".into()));
        }
        let start_time = LittleEndian::read_u64(&main.payload[0..8]);
        let frame_count = LittleEndian::read_u32(&main.payload[8..12]);
        let image = AdvImageSection::decode(&find_section(&sections, SECTION_IMAGE)?.payload)?;

        let reader = Self {
            version,
            sections,
            start_time,
            frame_count,
            image,
            data_offset: pos,
            mmap,
        };
        let needed = reader.data_offset + reader.frame_byte_size() * frame_count as usize;
        if reader.mmap.len() < needed {
            return Err(LuckyError::InvalidContainer(format!(
                "File truncated: expected at least {} bytes, got {}",
                needed,
                reader.mmap.len()
            )));
        }
        Ok(reader)
    }

    pub fn section(&self, name: &str) -> Option<&AdvSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn frame_byte_size(&self) -> usize {
        self.image.width as usize * self.image.height as usize * 2
    }

    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let total = self.frame_count as usize;
        if index >= total {
            return Err(LuckyError::FrameIndexOutOfRange { index, total });
        }
        let offset = self.data_offset + index * self.frame_byte_size();
        let raw = &self.mmap[offset..offset + self.frame_byte_size()];
        let mut samples = vec![0u16; raw.len() / 2];
        LittleEndian::read_u16_into(raw, &mut samples);

        let start = self
            .read_timestamp(index)
            .and_then(from_filetime)
            .or_else(|| from_filetime(self.start_time))
            .unwrap_or_default();
        Ok(Frame::new(self.image.width, self.image.height, samples, start, 0.0)?
            .with_index(index as u32 + 1))
    }

    pub fn read_timestamp(&self, index: usize) -> Option<u64> {
        let trailer = self.data_offset + self.frame_byte_size() * self.frame_count as usize;
        let at = trailer + index * 8;
        (index < self.frame_count as usize && at + 8 <= self.mmap.len())
            .then(|| LittleEndian::read_u64(&self.mmap[at..at + 8]))
    }

    pub fn timestamps(&self) -> Vec<u64> {
        (0..self.frame_count as usize)
            .map_while(|i| self.read_timestamp(i))
            .collect()
    }
}

fn read_section(buf: &[u8], pos: &mut usize) -> Result<AdvSection> {
    let truncated = || LuckyError::InvalidContainer("Truncated ADV section header".into());
    let head = buf.get(*pos..*pos + 4).ok_or_else(truncated)?;
    let section_type = BigEndian::read_u16(&head[0..2]);
    let name_len = LittleEndian::read_u16(&head[2..4]) as usize;
    *pos += 4;

    let name = buf.get(*pos..*pos + name_len).ok_or_else(truncated)?;
    let name = String::from_utf8_lossy(name).into_owned();
    *pos += name_len;

    let len = buf.get(*pos..*pos + 4).ok_or_else(truncated)?;
    let payload_len = LittleEndian::read_u32(len) as usize;
    *pos += 4;

    let payload = buf.get(*pos..*pos + payload_len).ok_or_else(truncated)?.to_vec();
    *pos += payload_len;

    Ok(AdvSection {
        section_type,
        name,
        payload,
    })
}

fn find_section<'a>(sections: &'a [AdvSection], name: &str) -> Result<&'a AdvSection> {
    sections
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| LuckyError::InvalidContainer(format!("Missing {name} section")))
}
