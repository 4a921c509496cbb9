#[allow(dead_code)]
mod common;

use std::path::Path;

use tempfile::TempDir;

use lucky_core::error::LuckyError;
use lucky_core::io::{inspect, open_container, read_frame, ContainerSpec, SaveFormat};

use common::{fixed_time, ramp_frame};

// ---------------------------------------------------------------------------
// SaveFormat
// ---------------------------------------------------------------------------

#[test]
fn test_save_format_default_is_ser() {
    assert_eq!(SaveFormat::default(), SaveFormat::Ser);
}

#[test]
fn test_save_format_parse_and_display() {
    for format in [
        SaveFormat::Fits,
        SaveFormat::Ser,
        SaveFormat::Adv,
        SaveFormat::FitsCube,
    ] {
        let parsed: SaveFormat = format.to_string().parse().unwrap();
        assert_eq!(parsed, format);
    }
    assert_eq!("CUBE".parse::<SaveFormat>().unwrap(), SaveFormat::FitsCube);
    assert!("tiff".parse::<SaveFormat>().is_err());
}

#[test]
fn test_container_path_naming() {
    let dir = Path::new("/data/captures");
    assert_eq!(
        SaveFormat::Ser.container_path(dir, "saturn", 7),
        dir.join("saturn_run007.ser")
    );
    assert_eq!(
        SaveFormat::FitsCube.container_path(dir, "saturn", 12),
        dir.join("saturn_run012.cube.fits")
    );
    assert_eq!(SaveFormat::Adv.extension(), "adv");
    assert_eq!(SaveFormat::Fits.extension(), "fits");
}

// ---------------------------------------------------------------------------
// open_container / inspect / read_frame
// ---------------------------------------------------------------------------

#[test]
fn test_open_container_rejects_zero_dimensions() {
    let dir = TempDir::new().unwrap();
    let spec = ContainerSpec::new(0, 10, fixed_time());
    let result = open_container(SaveFormat::Ser, &dir.path().join("zero.ser"), &spec);
    assert!(matches!(
        result,
        Err(LuckyError::InvalidDimensions {
            width: 0,
            height: 10
        })
    ));
}

#[test]
fn test_every_streaming_format_round_trips() {
    let dir = TempDir::new().unwrap();
    for format in [SaveFormat::Ser, SaveFormat::Adv, SaveFormat::FitsCube] {
        let path = format.container_path(dir.path(), "probe", 1);
        let mut spec = ContainerSpec::new(9, 5, fixed_time());
        spec.declared_frames = 2;

        let mut writer = open_container(format, &path, &spec).unwrap();
        assert_eq!(writer.format(), format);
        writer.add_frame(&ramp_frame(9, 5, 11)).unwrap();
        writer.add_frame(&ramp_frame(9, 5, 17)).unwrap();
        writer.close().unwrap();

        let summary = inspect(&path).unwrap();
        assert_eq!(summary.format, format, "{format}");
        assert_eq!((summary.width, summary.height), (9, 5));
        assert_eq!(summary.frame_count, 2);
        assert_eq!(summary.start_time, Some(fixed_time()));

        let frame = read_frame(&path, 1).unwrap();
        assert_eq!(frame.pixels(), ramp_frame(9, 5, 17).pixels());
    }
}

#[test]
fn test_inspect_reports_trailer_timestamps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stamps.ser");
    let mut writer =
        open_container(SaveFormat::Ser, &path, &ContainerSpec::new(2, 2, fixed_time())).unwrap();
    for _ in 0..4 {
        writer.add_frame(&ramp_frame(2, 2, 1)).unwrap();
    }
    writer.close().unwrap();
    assert_eq!(inspect(&path).unwrap().timestamps, 4);
}

#[test]
fn test_single_frame_fits_is_inspected_as_fits() {
    let dir = TempDir::new().unwrap();
    let base = dir.path().join("single_run001.fits");
    let mut writer =
        open_container(SaveFormat::Fits, &base, &ContainerSpec::new(4, 3, fixed_time())).unwrap();
    writer.add_frame(&ramp_frame(4, 3, 5)).unwrap();
    writer.close().unwrap();

    let first = dir.path().join("single_run001_00001.fits");
    let summary = inspect(&first).unwrap();
    assert_eq!(summary.format, SaveFormat::Fits);
    assert_eq!(summary.frame_count, 1);
    assert_eq!(read_frame(&first, 0).unwrap().pixels(), ramp_frame(4, 3, 5).pixels());
}

#[test]
fn test_inspect_unknown_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"clear skies").unwrap();
    assert!(matches!(
        inspect(&path),
        Err(LuckyError::InvalidContainer(_))
    ));
}

#[test]
fn test_summary_serializes_with_kebab_case_format() {
    let dir = TempDir::new().unwrap();
    let path = SaveFormat::FitsCube.container_path(dir.path(), "json", 1);
    let mut spec = ContainerSpec::new(3, 3, fixed_time());
    spec.declared_frames = 1;
    let mut writer = open_container(SaveFormat::FitsCube, &path, &spec).unwrap();
    writer.add_frame(&ramp_frame(3, 3, 1)).unwrap();
    writer.close().unwrap();

    let value = serde_json::to_value(inspect(&path).unwrap()).unwrap();
    assert_eq!(value["format"], "fits-cube");
    assert_eq!(value["frame_count"], 1);
    assert_eq!(value["width"], 3);
}
