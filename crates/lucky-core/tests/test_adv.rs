#[allow(dead_code)]
mod common;

use chrono::Duration;
use tempfile::TempDir;

use lucky_core::error::LuckyError;
use lucky_core::frame::{Binning, Frame};
use lucky_core::io::adv::{
    AdvReader, AdvWriter, ADV_TLV_TYPE, ADV_VERSION, SECTION_CALIBRATION, SECTION_COMPRESSION,
    SECTION_DATA_LAYOUT, SECTION_IMAGE, SECTION_MAIN, SECTION_STATUS,
};
use lucky_core::io::timestamp::to_filetime;
use lucky_core::io::{ContainerSpec, ContainerWriter};

use common::{fixed_time, full_device, ramp_frame};

fn spec(width: u32, height: u32) -> ContainerSpec {
    let mut spec = ContainerSpec::new(width, height, fixed_time());
    spec.binning = Binning { x: 2, y: 2 };
    spec.origin = (64, 32);
    spec
}

fn shifted(frame: &Frame, ms: i64) -> Frame {
    Frame::new(
        frame.width(),
        frame.height(),
        frame.pixels().to_vec(),
        fixed_time() + Duration::milliseconds(ms),
        0.01,
    )
    .unwrap()
}

#[test]
fn test_adv_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capture.adv");
    let input: Vec<Frame> = (0..4)
        .map(|i| shifted(&ramp_frame(10, 6, 5 + i), 20 * i as i64))
        .collect();

    let mut writer = AdvWriter::create(&path, &spec(10, 6)).unwrap();
    for frame in &input {
        writer.add_frame(frame).unwrap();
    }
    writer.close().unwrap();

    let reader = AdvReader::open(&path).unwrap();
    assert_eq!(reader.version, ADV_VERSION);
    assert_eq!(reader.frame_count, 4);
    assert_eq!(reader.start_time, to_filetime(fixed_time()));
    assert_eq!(reader.image.width, 10);
    assert_eq!(reader.image.height, 6);
    assert_eq!(reader.image.bits_per_pixel, 16);
    assert_eq!(reader.image.binning, Binning { x: 2, y: 2 });
    assert_eq!((reader.image.x_offset, reader.image.y_offset), (64, 32));

    for (i, expected) in input.iter().enumerate() {
        let frame = reader.read_frame(i).unwrap();
        assert_eq!(frame.pixels(), expected.pixels());
        assert_eq!(frame.exposure_start, expected.exposure_start);
        assert_eq!(frame.frame_index, i as u32 + 1);
    }
}

#[test]
fn test_adv_header_sections_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sections.adv");
    let mut writer = AdvWriter::create(&path, &spec(4, 4)).unwrap();
    writer.close().unwrap();

    let reader = AdvReader::open(&path).unwrap();
    let names: Vec<&str> = reader.sections.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        [
            SECTION_MAIN,
            SECTION_CALIBRATION,
            SECTION_IMAGE,
            SECTION_STATUS,
            SECTION_DATA_LAYOUT,
            SECTION_COMPRESSION
        ]
    );
    assert!(reader.sections.iter().all(|s| s.section_type == ADV_TLV_TYPE));
    assert_eq!(
        reader.section(SECTION_COMPRESSION).unwrap().payload,
        b"UNCOMPRESSED"
    );
    assert!(reader.section(SECTION_CALIBRATION).unwrap().payload.is_empty());
}

#[test]
fn test_adv_raw_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("raw.adv");
    let mut writer = AdvWriter::create(&path, &spec(2, 2)).unwrap();
    writer.add_frame(&ramp_frame(2, 2, 1)).unwrap();
    writer.add_frame(&ramp_frame(2, 2, 2)).unwrap();
    writer.close().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[0..4], b"FSTF");
    assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 2);
    // TLV type is big-endian, name length little-endian.
    assert_eq!(&bytes[8..10], &[0x00, 0x02]);
    assert_eq!(u16::from_le_bytes(bytes[10..12].try_into().unwrap()), 4);
    assert_eq!(&bytes[12..16], b"MAIN");
    assert_eq!(u32::from_le_bytes(bytes[28..32].try_into().unwrap()), 2);
}

#[test]
fn test_adv_zero_frames() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.adv");
    let mut writer = AdvWriter::create(&path, &spec(8, 8)).unwrap();
    writer.close().unwrap();

    let reader = AdvReader::open(&path).unwrap();
    assert_eq!(reader.frame_count, 0);
    assert!(reader.timestamps().is_empty());
    assert!(matches!(
        reader.read_frame(0),
        Err(LuckyError::FrameIndexOutOfRange { index: 0, total: 0 })
    ));
}

#[test]
fn test_adv_add_after_close_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("closed.adv");
    let mut writer = AdvWriter::create(&path, &spec(4, 4)).unwrap();
    writer.close().unwrap();
    assert!(matches!(
        writer.add_frame(&ramp_frame(4, 4, 1)),
        Err(LuckyError::InvalidState(_))
    ));
}

#[test]
fn test_adv_failed_close_is_not_reported_as_closed() {
    let Some(device) = full_device() else {
        return;
    };
    let Ok(mut writer) = AdvWriter::create(device, &spec(4, 4)) else {
        return;
    };
    writer.add_frame(&ramp_frame(4, 4, 1)).unwrap();

    assert!(matches!(writer.close(), Err(LuckyError::Io(_))));
    assert!(matches!(writer.close(), Err(LuckyError::InvalidState(_))));
}

#[test]
fn test_adv_rejects_wrong_size() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shape.adv");
    let mut writer = AdvWriter::create(&path, &spec(4, 4)).unwrap();
    assert!(matches!(
        writer.add_frame(&ramp_frame(5, 4, 1)),
        Err(LuckyError::ShapeMismatch { .. })
    ));
}

#[test]
fn test_adv_rejects_missing_signature() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.adv");
    std::fs::write(&path, b"NOPE\x02\x00\x00\x00").unwrap();
    assert!(matches!(
        AdvReader::open(&path),
        Err(LuckyError::InvalidContainer(_))
    ));
}
