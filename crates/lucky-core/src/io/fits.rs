//! FITS header cards and a reader for 16-bit images and cubes.
//!
//! Headers are sequences of 80-byte ASCII cards terminated by `END` and
//! padded with spaces to a 2880-byte block. Data is big-endian signed 16-bit
//! with `BZERO = 32768` mapping it back onto the unsigned sensor range.

use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, NaiveDateTime, Utc};
use memmap2::Mmap;

use crate::consts::{FITS_BLOCK_SIZE, FITS_BZERO, FITS_CARD_SIZE, FITS_MAX_TEXT_LEN};
use crate::error::{LuckyError, Result};
use crate::frame::Frame;
use crate::io::container::ContainerSpec;
use crate::io::timestamp::{format_millis, julian_date};

/// Value of the `PLCREATE` card.
pub const CREATOR: &str = concat!("lucky-", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug, PartialEq)]
pub enum CardValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitsCard {
    pub keyword: String,
    pub value: CardValue,
    pub comment: Option<String>,
}

impl FitsCard {
    pub fn new(keyword: &str, value: CardValue) -> Self {
        Self {
            keyword: keyword.to_ascii_uppercase(),
            value,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Render as exactly 80 ASCII bytes.
    pub fn render(&self) -> Vec<u8> {
        let value = match &self.value {
            CardValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
            CardValue::Integer(i) => format!("{i:>20}"),
            CardValue::Float(f) => format!("{:>20}", format_float(*f)),
            CardValue::Text(s) => format!("'{:<8}'", escape_text(s)),
        };
        let mut card = format!("{:<8}= {}", self.keyword, value);
        if let Some(comment) = &self.comment {
            card.push_str(" / ");
            card.push_str(comment);
        }
        pad_card(card)
    }

    /// Parse one 80-byte card. Returns `None` for commentary and blank cards.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        if raw.len() < 10 || !raw.is_ascii() || &raw[8..10] != b"= " {
            return None;
        }
        let text = std::str::from_utf8(raw).ok()?;
        let keyword = text[..8].trim_end().to_string();
        let rest = text[10..].trim_start();

        let (value, tail) = if let Some(body) = rest.strip_prefix('\'') {
            let (s, tail) = parse_quoted(body)?;
            (CardValue::Text(s.trim_end().to_string()), tail)
        } else {
            let (token, tail) = match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => (rest, ""),
            };
            (parse_scalar(token.trim())?, tail)
        };
        let comment = tail
            .trim_start()
            .strip_prefix('/')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Some(Self {
            keyword,
            value,
            comment,
        })
    }
}

/// Quote-doubled text that fits between the quotes of a value card.
/// Long values are cut at a character boundary, never inside a `''` pair.
fn escape_text(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()) {
        let width = if c == '\'' { 2 } else { 1 };
        if out.len() + width > FITS_MAX_TEXT_LEN {
            break;
        }
        out.push(c);
        if c == '\'' {
            out.push('\'');
        }
    }
    out
}

fn format_float(f: f64) -> String {
    let plain = format!("{f}");
    if plain.len() > 20 {
        return format!("{f:.12E}");
    }
    if plain.contains(['.', 'e', 'E']) || !f.is_finite() {
        plain
    } else {
        format!("{plain}.0")
    }
}

fn pad_card(mut card: String) -> Vec<u8> {
    card.truncate(FITS_CARD_SIZE);
    let mut bytes = card.into_bytes();
    bytes.resize(FITS_CARD_SIZE, b' ');
    bytes
}

fn parse_quoted(body: &str) -> Option<(String, &str)> {
    let mut out = String::new();
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                out.push('\'');
                chars.next();
            } else {
                return Some((out, &body[i + 1..]));
            }
        } else {
            out.push(c);
        }
    }
    None
}

fn parse_scalar(token: &str) -> Option<CardValue> {
    match token {
        "T" => return Some(CardValue::Logical(true)),
        "F" => return Some(CardValue::Logical(false)),
        _ => {}
    }
    if let Ok(i) = token.parse::<i64>() {
        return Some(CardValue::Integer(i));
    }
    token.replace('D', "E").parse::<f64>().ok().map(CardValue::Float)
}

/// Ordered list of header cards.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<FitsCard>,
}

impl FitsHeader {
    /// Mandatory cards for a 16-bit image (`planes = None`) or cube.
    pub fn image(width: u32, height: u32, planes: Option<u32>) -> Self {
        let mut header = Self::default();
        header.push(FitsCard::new("SIMPLE", CardValue::Logical(true)));
        header.push(FitsCard::new("BITPIX", CardValue::Integer(16)));
        header.push(FitsCard::new(
            "NAXIS",
            CardValue::Integer(if planes.is_some() { 3 } else { 2 }),
        ));
        header.push(FitsCard::new("NAXIS1", CardValue::Integer(width as i64)));
        header.push(FitsCard::new("NAXIS2", CardValue::Integer(height as i64)));
        if let Some(planes) = planes {
            header.push(FitsCard::new("NAXIS3", CardValue::Integer(planes as i64)));
        }
        header.push(FitsCard::new("BZERO", CardValue::Integer(FITS_BZERO as i64)));
        header.push(FitsCard::new("BSCALE", CardValue::Integer(1)));
        header
    }

    pub fn push(&mut self, card: FitsCard) {
        self.cards.push(card);
    }

    pub fn cards(&self) -> &[FitsCard] {
        &self.cards
    }

    pub fn get(&self, keyword: &str) -> Option<&CardValue> {
        self.cards
            .iter()
            .find(|c| c.keyword == keyword)
            .map(|c| &c.value)
    }

    pub fn integer(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            CardValue::Integer(i) => Some(*i),
            CardValue::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn float(&self, keyword: &str) -> Option<f64> {
        match self.get(keyword)? {
            CardValue::Integer(i) => Some(*i as f64),
            CardValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn text(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            CardValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Byte offset of a card from the start of the header.
    pub fn card_offset(&self, keyword: &str) -> Option<u64> {
        self.cards
            .iter()
            .position(|c| c.keyword == keyword)
            .map(|i| (i * FITS_CARD_SIZE) as u64)
    }

    /// Encoded header: cards, `END`, space padding to a whole block.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FITS_BLOCK_SIZE);
        for card in &self.cards {
            out.extend_from_slice(&card.render());
        }
        out.extend_from_slice(&pad_card("END".to_string()));
        let padded = out.len().div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
        out.resize(padded, b' ');
        out
    }

    /// Capture metadata cards shared by cubes and single frames.
    pub fn add_capture_metadata(&mut self, spec: &ContainerSpec) {
        self.push(
            FitsCard::new("DATE-OBS", CardValue::Text(format_millis(spec.start_time)))
                .with_comment("UTC exposure start"),
        );
        self.push(
            FitsCard::new("EXPTIME", CardValue::Float(spec.exposure_seconds))
                .with_comment("[s] Exposure duration"),
        );
        self.push(FitsCard::new("XBINNING", CardValue::Integer(spec.binning.x as i64)));
        self.push(FitsCard::new("YBINNING", CardValue::Integer(spec.binning.y as i64)));
        self.push(
            FitsCard::new("XORGSUBF", CardValue::Integer(spec.origin.0 as i64))
                .with_comment("X-position of the ROI"),
        );
        self.push(
            FitsCard::new("YORGSUBF", CardValue::Integer(spec.origin.1 as i64))
                .with_comment("Y-position of the ROI"),
        );
        self.push(
            FitsCard::new("LUCKYRUN", CardValue::Integer(spec.run_id as i64))
                .with_comment("Lucky imaging run for the target"),
        );
        for (key, value) in [
            ("INSTRUME", &spec.instrument),
            ("OBSERVER", &spec.observer),
            ("TELESCOP", &spec.telescope),
        ] {
            if !value.is_empty() {
                self.push(FitsCard::new(key, CardValue::Text(value.clone())));
            }
        }
        self.push(
            FitsCard::new("PLCREATE", CardValue::Text(CREATOR.to_string()))
                .with_comment("Software that created this file"),
        );
    }

    /// Julian dates for one exposure.
    pub fn add_exposure_dates(&mut self, frame: &Frame) {
        self.push(
            FitsCard::new("JD-BEG", CardValue::Float(julian_date(frame.exposure_start)))
                .with_comment("Julian exposure start date"),
        );
        self.push(
            FitsCard::new("JD-OBS", CardValue::Float(julian_date(frame.exposure_mid())))
                .with_comment("Julian exposure mid date"),
        );
        self.push(
            FitsCard::new("JD-END", CardValue::Float(julian_date(frame.exposure_end())))
                .with_comment("Julian exposure end date"),
        );
    }

    /// Parse cards from `buf` up to `END`; returns the header and its padded length.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let mut header = Self::default();
        for (i, raw) in buf.chunks_exact(FITS_CARD_SIZE).enumerate() {
            if raw.starts_with(b"END") && raw[3..].iter().all(|&b| b == b' ') {
                let len = ((i + 1) * FITS_CARD_SIZE).div_ceil(FITS_BLOCK_SIZE) * FITS_BLOCK_SIZE;
                return Ok((header, len));
            }
            if let Some(card) = FitsCard::parse(raw) {
                header.push(card);
            }
        }
        Err(LuckyError::InvalidContainer("FITS header has no END card".into()))
    }
}

/// Encode unsigned samples as biased big-endian signed 16-bit data.
pub fn encode_samples(pixels: &[u16], out: &mut [u8]) {
    for (dst, &px) in out.chunks_exact_mut(2).zip(pixels) {
        let signed = (px as i32 - FITS_BZERO) as i16;
        BigEndian::write_i16(dst, signed);
    }
}

/// Zero bytes needed to fill the current block.
pub fn block_padding(len: u64) -> usize {
    let block = FITS_BLOCK_SIZE as u64;
    (len.div_ceil(block) * block - len) as usize
}

/// Memory-mapped reader for 16-bit FITS images and cubes.
pub struct FitsReader {
    mmap: Mmap,
    pub header: FitsHeader,
    data_offset: usize,
    width: u32,
    height: u32,
    planes: u32,
    bzero: i32,
}

impl FitsReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if !mmap.starts_with(b"SIMPLE  =") {
            return Err(LuckyError::InvalidContainer("Missing SIMPLE card".into()));
        }
        let (header, data_offset) = FitsHeader::parse(&mmap)?;

        if header.integer("BITPIX") != Some(16) {
            return Err(LuckyError::InvalidContainer(
                "Only BITPIX = 16 is supported".into(),
            ));
        }
        let naxis = header.integer("NAXIS").unwrap_or(0);
        if !(2..=3).contains(&naxis) {
            return Err(LuckyError::InvalidContainer(format!(
                "Unsupported NAXIS = {naxis}"
            )));
        }
        let width = header.integer("NAXIS1").unwrap_or(0) as u32;
        let height = header.integer("NAXIS2").unwrap_or(0) as u32;
        if width == 0 || height == 0 {
            return Err(LuckyError::InvalidDimensions { width, height });
        }
        let planes = if naxis == 3 {
            header.integer("NAXIS3").unwrap_or(0) as u32
        } else {
            1
        };
        let bzero = header.integer("BZERO").unwrap_or(0) as i32;

        let reader = Self {
            mmap,
            header,
            data_offset,
            width,
            height,
            planes,
            bzero,
        };
        let needed = reader.data_offset + reader.plane_byte_size() * planes as usize;
        if reader.mmap.len() < needed {
            return Err(LuckyError::InvalidContainer(format!(
                "File truncated: expected at least {} bytes, got {}",
                needed,
                reader.mmap.len()
            )));
        }
        Ok(reader)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of image planes (1 for a plain image).
    pub fn frame_count(&self) -> usize {
        self.planes as usize
    }

    pub fn data_len(&self) -> usize {
        self.mmap.len() - self.data_offset
    }

    fn plane_byte_size(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }

    pub fn date_obs(&self) -> Option<DateTime<Utc>> {
        let text = self.header.text("DATE-OBS")?;
        NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|t| t.and_utc())
    }

    /// Decode one plane back into unsigned samples (`sample = value + BZERO`).
    pub fn read_frame(&self, index: usize) -> Result<Frame> {
        let total = self.frame_count();
        if index >= total {
            return Err(LuckyError::FrameIndexOutOfRange { index, total });
        }
        let offset = self.data_offset + index * self.plane_byte_size();
        let raw = &self.mmap[offset..offset + self.plane_byte_size()];
        let samples: Vec<u16> = raw
            .chunks_exact(2)
            .map(|b| (BigEndian::read_i16(b) as i32 + self.bzero).clamp(0, u16::MAX as i32) as u16)
            .collect();

        let exposure = self.header.float("EXPTIME").unwrap_or(0.0);
        let start = self.date_obs().unwrap_or_default();
        let number = self
            .header
            .integer("FRAMENUM")
            .map(|n| n as u32)
            .unwrap_or(index as u32 + 1);
        Ok(Frame::new(self.width, self.height, samples, start, exposure)?.with_index(number))
    }
}
