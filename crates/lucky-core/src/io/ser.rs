use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use chrono::{DateTime, Utc};
use memmap2::Mmap;

use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::container::ContainerSpec;
use crate::io::timestamp::{from_filetime, local_filetime, to_filetime};

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";
/// Byte offset of the FrameCount field inside the header.
pub const SER_FRAME_COUNT_OFFSET: u64 = 38;
pub const SER_COLOR_MONO: i32 = 0;

/// Byte order of the 16-bit samples, declared by the header's endianness flag.
///
/// Flag values follow the convention most players use: 0 = little-endian,
/// 1 = big-endian.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SerByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl SerByteOrder {
    pub fn flag(self) -> i32 {
        match self {
            Self::LittleEndian => 0,
            Self::BigEndian => 1,
        }
    }

    pub fn from_flag(flag: i32) -> Self {
        if flag == 1 {
            Self::BigEndian
        } else {
            Self::LittleEndian
        }
    }

    pub fn encode(self, samples: &[u16], out: &mut [u8]) {
        match self {
            Self::LittleEndian => LittleEndian::write_u16_into(samples, out),
            Self::BigEndian => BigEndian::write_u16_into(samples, out),
        }
    }

    pub fn decode(self, raw: &[u8], out: &mut [u16]) {
        match self {
            Self::LittleEndian => LittleEndian::read_u16_into(raw, out),
            Self::BigEndian => BigEndian::read_u16_into(raw, out),
        }
    }
}

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub byte_order: SerByteOrder,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    /// Start time, local wall clock, FILETIME.
    pub date_time: u64,
    /// Start time, UTC, FILETIME.
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Header for a 16-bit mono capture; the frame count starts at zero.
    pub fn for_capture(spec: &ContainerSpec, byte_order: SerByteOrder) -> Self {
        Self {
            color_id: SER_COLOR_MONO,
            byte_order,
            width: spec.width,
            height: spec.height,
            pixel_depth: 16,
            frame_count: 0,
            observer: spec.observer.clone(),
            instrument: spec.instrument.clone(),
            telescope: spec.telescope.clone(),
            date_time: local_filetime(spec.start_time),
            date_time_utc: to_filetime(spec.start_time),
        }
    }

    /// Bytes per sample (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_sample(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total bytes per frame.
    pub fn frame_byte_size(&self) -> usize {
        self.pixel_count()
            .checked_mul(self.bytes_per_sample())
            .expect("Frame size calculation overflow")
    }

    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        from_filetime(self.date_time_utc)
    }
}

/// Memory-mapped SER file reader.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
}

impl SerReader {
    /// Open a SER file and parse its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };

        if mmap.len() < SER_HEADER_SIZE {
            return Err(LuckyError::InvalidContainer(
                "File too small for SER header".into(),
            ));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(LuckyError::InvalidContainer(
                "Missing LUCAM-RECORDER magic".into(),
            ));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;

        let expected_data_size =
            SER_HEADER_SIZE + header.frame_byte_size() * header.frame_count as usize;
        if mmap.len() < expected_data_size {
            return Err(LuckyError::InvalidContainer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        Ok(Self { mmap, header })
    }

    pub fn frame_count(&self) -> usize {
        self.header.frame_count as usize
    }

    /// Get the raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.frame_count();
        if index >= count {
            return Err(LuckyError::FrameIndexOutOfRange {
                index,
                total: count,
            });
        }
        let offset = SER_HEADER_SIZE + index * self.header.frame_byte_size();
        let end = offset + self.header.frame_byte_size();
        Ok(&self.mmap[offset..end])
    }

    /// Decode a single frame into raw samples.
    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let raw = self.frame_raw(index)?;
        let mut samples = vec![0u16; self.header.pixel_count()];
        if self.header.bytes_per_sample() == 1 {
            for (dst, &b) in samples.iter_mut().zip(raw) {
                *dst = b as u16;
            }
        } else {
            self.header.byte_order.decode(raw, &mut samples);
        }

        let start = self
            .read_timestamp(index)
            .and_then(from_filetime)
            .or_else(|| self.header.start_time_utc())
            .unwrap_or_default();
        let frame = Frame::new(self.header.width, self.header.height, samples, start, 0.0)?;
        Ok(frame.with_index(index as u32 + 1))
    }

    /// Read per-frame timestamp from the optional trailer.
    pub fn read_timestamp(&self, index: usize) -> Option<u64> {
        let trailer_offset =
            SER_HEADER_SIZE + self.header.frame_byte_size() * self.header.frame_count as usize;
        let ts_offset = trailer_offset + index * 8;
        if ts_offset + 8 <= self.mmap.len() {
            let bytes = &self.mmap[ts_offset..ts_offset + 8];
            Some(u64::from_le_bytes(bytes.try_into().ok()?))
        } else {
            None
        }
    }

    /// All trailer timestamps, or an empty list when the trailer is absent.
    pub fn timestamps(&self) -> Vec<u64> {
        (0..self.frame_count())
            .map_while(|i| self.read_timestamp(i))
            .collect()
    }

    /// Iterator over all frames.
    pub fn frames(&self) -> impl Iterator<Item = Result<Frame>> + '_ {
        (0..self.frame_count()).map(move |i| self.read_frame(i))
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let endian_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(LuckyError::InvalidDimensions { width, height });
    }

    Ok(SerHeader {
        color_id,
        byte_order: SerByteOrder::from_flag(endian_flag),
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}
