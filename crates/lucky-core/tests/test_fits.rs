#[allow(dead_code)]
mod common;

use approx::assert_relative_eq;
use chrono::Duration;
use tempfile::TempDir;

use lucky_core::consts::{FITS_BLOCK_SIZE, FITS_CARD_SIZE, FITS_MAX_TEXT_LEN};
use lucky_core::error::LuckyError;
use lucky_core::frame::Frame;
use lucky_core::io::fits::{
    block_padding, encode_samples, CardValue, FitsCard, FitsHeader, FitsReader, CREATOR,
};
use lucky_core::io::fits_cube::FitsCubeWriter;
use lucky_core::io::fits_frame::FitsFrameWriter;
use lucky_core::io::{ContainerSpec, ContainerWriter};

use common::{fixed_time, full_device, ramp_frame};

fn spec(width: u32, height: u32, declared: u32) -> ContainerSpec {
    let mut spec = ContainerSpec::new(width, height, fixed_time());
    spec.exposure_seconds = 0.01;
    spec.declared_frames = declared;
    spec.run_id = 3;
    spec.observer = "M. Observer".into();
    spec
}

fn extremes_frame() -> Frame {
    Frame::new(2, 2, vec![0, 1, 32768, 65535], fixed_time(), 0.01).unwrap()
}

// ---------------------------------------------------------------------------
// Cards and headers
// ---------------------------------------------------------------------------

#[test]
fn test_card_render_is_80_bytes() {
    let card = FitsCard::new("naxis1", CardValue::Integer(640)).with_comment("width");
    let raw = card.render();
    assert_eq!(raw.len(), FITS_CARD_SIZE);
    assert!(raw.starts_with(b"NAXIS1  = "));
}

#[test]
fn test_card_parse_round_trip() {
    let cards = [
        FitsCard::new("SIMPLE", CardValue::Logical(true)),
        FitsCard::new("BITPIX", CardValue::Integer(16)),
        FitsCard::new("EXPTIME", CardValue::Float(0.01)).with_comment("[s] Exposure duration"),
        FitsCard::new("XBINNING", CardValue::Float(3.0)),
        FitsCard::new("OBSERVER", CardValue::Text("O'Neil".into())),
    ];
    for card in cards {
        let parsed = FitsCard::parse(&card.render()).unwrap();
        assert_eq!(parsed, card);
    }
}

#[test]
fn test_long_text_card_keeps_closing_quote() {
    let long = format!("{}'tail", "A".repeat(67));
    let raw = FitsCard::new("OBSERVER", CardValue::Text(long)).render();
    assert_eq!(raw.len(), FITS_CARD_SIZE);
    // "OBSERVER= '" then 67 characters, then the closing quote.
    assert_eq!(raw[78], b'\'');

    // A doubled quote that would not fit is dropped whole.
    let parsed = FitsCard::parse(&raw).unwrap();
    assert_eq!(parsed.value, CardValue::Text("A".repeat(67)));
}

#[test]
fn test_card_parse_skips_commentary() {
    let mut raw = b"COMMENT this is not a value card".to_vec();
    raw.resize(FITS_CARD_SIZE, b' ');
    assert!(FitsCard::parse(&raw).is_none());
}

#[test]
fn test_header_encode_is_block_padded() {
    let mut header = FitsHeader::image(64, 48, None);
    header.add_capture_metadata(&spec(64, 48, 0));
    let encoded = header.encode();
    assert_eq!(encoded.len() % FITS_BLOCK_SIZE, 0);

    let (parsed, len) = FitsHeader::parse(&encoded).unwrap();
    assert_eq!(len, encoded.len());
    assert_eq!(parsed, header);
    assert_eq!(parsed.integer("NAXIS"), Some(2));
    assert_eq!(parsed.integer("BZERO"), Some(32768));
    assert_eq!(parsed.integer("LUCKYRUN"), Some(3));
    assert_eq!(parsed.text("OBSERVER"), Some("M. Observer"));
    assert_eq!(parsed.text("PLCREATE"), Some(CREATOR));
    assert_eq!(parsed.text("DATE-OBS"), Some("2024-03-01T22:00:00.000"));
}

#[test]
fn test_empty_identity_cards_are_omitted() {
    let mut header = FitsHeader::image(4, 4, None);
    header.add_capture_metadata(&ContainerSpec::new(4, 4, fixed_time()));
    assert!(header.get("OBSERVER").is_none());
    assert!(header.get("TELESCOP").is_none());
    assert!(header.get("INSTRUME").is_none());
}

#[test]
fn test_header_without_end_is_rejected() {
    let raw = FitsCard::new("SIMPLE", CardValue::Logical(true)).render();
    assert!(matches!(
        FitsHeader::parse(&raw),
        Err(LuckyError::InvalidContainer(_))
    ));
}

#[test]
fn test_sample_encoding_is_biased_big_endian() {
    let mut out = [0u8; 6];
    encode_samples(&[0, 32768, 65535], &mut out);
    assert_eq!(out, [0x80, 0x00, 0x00, 0x00, 0x7F, 0xFF]);
}

#[test]
fn test_block_padding() {
    assert_eq!(block_padding(0), 0);
    assert_eq!(block_padding(1), FITS_BLOCK_SIZE - 1);
    assert_eq!(block_padding(FITS_BLOCK_SIZE as u64), 0);
}

// ---------------------------------------------------------------------------
// Cube writer
// ---------------------------------------------------------------------------

#[test]
fn test_cube_naxis3_patched_to_written_count() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cube.fits");
    let mut writer = FitsCubeWriter::create(&path, &spec(6, 4, 10)).unwrap();
    assert_eq!(writer.header().integer("NAXIS3"), Some(10));
    for step in 1..=3 {
        writer.add_frame(&ramp_frame(6, 4, step)).unwrap();
    }
    writer.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len() % FITS_BLOCK_SIZE, 0);

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.header.integer("NAXIS"), Some(3));
    assert_eq!(reader.frame_count(), 3);
    for (i, step) in (1..=3).enumerate() {
        let frame = reader.read_frame(i).unwrap();
        assert_eq!(frame.pixels(), ramp_frame(6, 4, step).pixels());
        assert_eq!(frame.frame_index, i as u32 + 1);
    }
}

#[test]
fn test_cube_preserves_full_sample_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("range.fits");
    let mut writer = FitsCubeWriter::create(&path, &spec(2, 2, 1)).unwrap();
    writer.add_frame(&extremes_frame()).unwrap();
    writer.close().unwrap();

    let frame = FitsReader::open(&path).unwrap().read_frame(0).unwrap();
    assert_eq!(frame.pixels(), &[0, 1, 32768, 65535]);
    assert_relative_eq!(frame.exposure_seconds, 0.01);
    assert_eq!(frame.exposure_start, fixed_time());
}

#[test]
fn test_cube_zero_frames() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.fits");
    let mut writer = FitsCubeWriter::create(&path, &spec(4, 4, 50)).unwrap();
    writer.close().unwrap();

    let reader = FitsReader::open(&path).unwrap();
    assert_eq!(reader.frame_count(), 0);
    assert_eq!(reader.data_len(), 0);
}

#[test]
fn test_cube_long_observer_is_truncated_not_broken() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("observer.fits");
    let mut spec = spec(2, 2, 1);
    spec.observer = "A".repeat(75);
    let mut writer = FitsCubeWriter::create(&path, &spec).unwrap();
    writer.add_frame(&extremes_frame()).unwrap();
    writer.close().unwrap();

    let reader = FitsReader::open(&path).unwrap();
    let expected = "A".repeat(FITS_MAX_TEXT_LEN);
    assert_eq!(reader.header.text("OBSERVER"), Some(expected.as_str()));
    assert_eq!(reader.read_frame(0).unwrap().pixels(), &[0, 1, 32768, 65535]);
}

#[test]
fn test_cube_failed_close_is_not_reported_as_closed() {
    let Some(device) = full_device() else {
        return;
    };
    let Ok(mut writer) = FitsCubeWriter::create(device, &spec(2, 2, 1)) else {
        return;
    };
    writer.add_frame(&extremes_frame()).unwrap();

    assert!(matches!(writer.close(), Err(LuckyError::Io(_))));
    assert!(matches!(writer.close(), Err(LuckyError::InvalidState(_))));
}

#[test]
fn test_cube_add_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("closed.fits");
    let mut writer = FitsCubeWriter::create(&path, &spec(2, 2, 1)).unwrap();
    writer.close().unwrap();
    assert!(matches!(
        writer.add_frame(&extremes_frame()),
        Err(LuckyError::InvalidState(_))
    ));
}

// ---------------------------------------------------------------------------
// One file per frame
// ---------------------------------------------------------------------------

#[test]
fn test_frame_series_writes_numbered_files() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("saturn_run003.fits");
    let mut writer = FitsFrameWriter::create(&base, &spec(3, 3, 0)).unwrap();

    for i in 0..3 {
        let base_frame = ramp_frame(3, 3, 2 + i);
        let frame = Frame::new(
            3,
            3,
            base_frame.pixels().to_vec(),
            fixed_time() + Duration::seconds(i as i64),
            0.5,
        )
        .unwrap();
        writer.add_frame(&frame).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(writer.frames_written(), 3);
    assert_eq!(writer.path(), base.as_path());
    let paths = writer.written_paths().to_vec();
    assert_eq!(paths[0], dir.path().join("saturn_run003_00001.fits"));
    assert_eq!(paths[2], dir.path().join("saturn_run003_00003.fits"));

    let reader = FitsReader::open(&paths[1]).unwrap();
    assert_eq!(reader.header.integer("NAXIS"), Some(2));
    assert_eq!(reader.header.integer("FRAMENUM"), Some(2));
    assert_relative_eq!(reader.header.float("EXPTIME").unwrap(), 0.5);
    assert_eq!(reader.date_obs(), Some(fixed_time() + Duration::seconds(1)));

    let jd_beg = reader.header.float("JD-BEG").unwrap();
    let jd_obs = reader.header.float("JD-OBS").unwrap();
    let jd_end = reader.header.float("JD-END").unwrap();
    assert_relative_eq!(jd_end - jd_beg, 0.5 / 86_400.0, epsilon = 1e-8);
    assert_relative_eq!(jd_obs - jd_beg, 0.25 / 86_400.0, epsilon = 1e-8);

    let frame = reader.read_frame(0).unwrap();
    assert_eq!(frame.frame_index, 2);
    assert_eq!(frame.pixels(), ramp_frame(3, 3, 3).pixels());
}

#[test]
fn test_frame_series_add_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("series.fits");
    let mut writer = FitsFrameWriter::create(&base, &spec(2, 2, 0)).unwrap();
    writer.close().unwrap();
    assert!(matches!(
        writer.add_frame(&extremes_frame()),
        Err(LuckyError::InvalidState(_))
    ));
    assert!(writer.written_paths().is_empty());
}

#[test]
fn test_reader_rejects_eight_bit_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bytes.fits");
    let mut header = FitsHeader::default();
    header.push(FitsCard::new("SIMPLE", CardValue::Logical(true)));
    header.push(FitsCard::new("BITPIX", CardValue::Integer(8)));
    header.push(FitsCard::new("NAXIS", CardValue::Integer(2)));
    header.push(FitsCard::new("NAXIS1", CardValue::Integer(2)));
    header.push(FitsCard::new("NAXIS2", CardValue::Integer(2)));
    let mut bytes = header.encode();
    bytes.extend_from_slice(&[0u8; FITS_BLOCK_SIZE]);
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        FitsReader::open(&path),
        Err(LuckyError::InvalidContainer(_))
    ));
}
