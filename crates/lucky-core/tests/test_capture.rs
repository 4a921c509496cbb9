#[allow(dead_code)]
mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use futures::StreamExt;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use lucky_core::capture::frame_log::FrameLog;
use lucky_core::capture::memory::{FixedMemoryProbe, MemoryProbe, SystemMemoryProbe};
use lucky_core::capture::persist::PersistQueue;
use lucky_core::capture::reconnect::wait_for_reconnect;
use lucky_core::capture::sink::{FrameSink, PersistRequest, PreviewSink};
use lucky_core::capture::synthetic::SyntheticCamera;
use lucky_core::capture::{FrameSource, LiveViewRequest, StatisticsConfig};
use lucky_core::error::LuckyError;
use lucky_core::frame::{Binning, Roi};
use lucky_core::io::preview::Stretch;
use lucky_core::stats::compute_exact;

use common::{fixed_time, ramp_frame, star_frame, RecordingSink};

fn live_view(binning: u32, subsample: Option<Roi>, exposure: f64) -> LiveViewRequest {
    LiveViewRequest {
        exposure_seconds: exposure,
        binning: Binning {
            x: binning,
            y: binning,
        },
        subsample,
    }
}

fn request(frame_number: u32) -> PersistRequest {
    PersistRequest {
        run_id: 1,
        frame_number,
        total_frames: 10,
        frame: Arc::new(ramp_frame(8, 8, 3)),
        statistics: None,
    }
}

// ---------------------------------------------------------------------------
// Synthetic camera
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_synthetic_full_sensor_frames() {
    let mut camera = SyntheticCamera::new(64, 48);
    camera.frame_limit = Some(3);
    camera.start_time = fixed_time();

    let frames: Vec<_> = camera
        .live_view(&live_view(1, None, 0.5), CancellationToken::new())
        .collect()
        .await;
    assert_eq!(frames.len(), 3);

    let second = frames[1].as_ref().unwrap();
    assert_eq!((second.width(), second.height()), (64, 48));
    assert_eq!(
        second.exposure_start,
        fixed_time() + chrono::Duration::milliseconds(500)
    );
    // The star sits at the sensor center.
    let center = (24 * 64 + 32) as usize;
    assert_eq!(second.pixels()[center], camera.star_peak);
}

#[tokio::test]
async fn test_synthetic_subsample_and_binning() {
    let mut camera = SyntheticCamera::new(64, 48);
    camera.frame_limit = Some(1);
    let roi = Roi::new(8, 8, 16, 16);

    let mut stream = camera.live_view(&live_view(2, Some(roi), 0.01), CancellationToken::new());
    let frame = stream.next().await.unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 8));
    assert_eq!(camera.current_subsample(), Some(roi));
}

#[tokio::test]
async fn test_synthetic_set_subsample_only_when_active() {
    let camera = SyntheticCamera::new(64, 48);
    let _stream = camera.live_view(&live_view(1, None, 0.01), CancellationToken::new());
    camera.set_subsample(Roi::new(0, 0, 16, 16)).await.unwrap();
    assert_eq!(camera.current_subsample(), None);

    let _stream = camera.live_view(
        &live_view(1, Some(Roi::new(0, 0, 16, 16)), 0.01),
        CancellationToken::new(),
    );
    camera.set_subsample(Roi::new(10, 10, 16, 16)).await.unwrap();
    assert_eq!(camera.current_subsample(), Some(Roi::new(10, 10, 16, 16)));

    let err = camera.set_subsample(Roi::new(60, 0, 16, 16)).await.unwrap_err();
    assert!(matches!(err, LuckyError::InvalidDimensions { .. }));
}

#[tokio::test]
async fn test_synthetic_stream_ends_on_cancel() {
    let camera = SyntheticCamera::new(16, 16);
    let cancel = CancellationToken::new();
    let mut stream = camera.live_view(&live_view(1, None, 0.01), cancel.clone());
    assert!(stream.next().await.is_some());
    cancel.cancel();
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_synthetic_disconnect_polls() {
    let camera = SyntheticCamera::new(16, 16);
    camera.disconnect_for(2);
    assert!(!camera.is_connected().await);
    assert!(!camera.is_connected().await);
    assert!(camera.is_connected().await);
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_wait_for_reconnect_returns_once_connected() {
    let camera = SyntheticCamera::new(16, 16);
    camera.disconnect_for(3);
    wait_for_reconnect(&camera, Duration::from_millis(1), &CancellationToken::new())
        .await
        .unwrap();
    assert!(camera.is_connected().await);
}

#[tokio::test]
async fn test_wait_for_reconnect_cancelled() {
    let camera = SyntheticCamera::new(16, 16);
    camera.disconnect_for(u32::MAX);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = wait_for_reconnect(&camera, Duration::from_millis(1), &cancel).await;
    assert!(matches!(result, Err(LuckyError::Cancelled)));
}

// ---------------------------------------------------------------------------
// Persistence queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_persist_queue_drains_everything() {
    let sink = Arc::new(RecordingSink {
        fail_on: vec![3, 7],
        ..RecordingSink::default()
    });
    let mut queue = PersistQueue::new();
    for n in 1..=10 {
        queue.push(request(n));
    }
    assert_eq!(queue.len(), 10);

    let outcome = queue.drain(sink.clone(), 4).await;
    assert_eq!(outcome.completed, 8);
    assert_eq!(outcome.failed, 2);
    assert_eq!(sink.recorded(), vec![1, 2, 4, 5, 6, 8, 9, 10]);
}

#[tokio::test]
async fn test_empty_persist_queue() {
    let sink = Arc::new(RecordingSink::default());
    let outcome = PersistQueue::new().drain(sink.clone(), 0).await;
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.failed, 0);
    assert!(sink.recorded().is_empty());
}

#[tokio::test]
async fn test_preview_sink_writes_png() {
    let dir = TempDir::new().unwrap();
    let sink = PreviewSink::new(dir.path().join("previews"), StatisticsConfig::default());
    let mut req = request(4);
    req.frame = Arc::new(star_frame(32, 24, 10, 10, 2));
    sink.persist(req).await.unwrap();

    let path = sink.preview_path(1, 4);
    assert!(path.ends_with("preview_run001_00004.png"));
    let img = image::open(&path).unwrap().to_luma8();
    assert_eq!(img.dimensions(), (32, 24));
    assert_eq!(img.get_pixel(10, 10).0[0], 255);
}

// ---------------------------------------------------------------------------
// Frame log
// ---------------------------------------------------------------------------

#[test]
fn test_frame_log_file_name_uses_24_hour_clock() {
    let at = Local.with_ymd_and_hms(2024, 3, 1, 23, 5, 9).unwrap();
    assert_eq!(
        FrameLog::file_name(4, at),
        "FrameList-4-2024-03-01 23-05-09.csv"
    );
}

#[test]
fn test_frame_log_rows() {
    let dir = TempDir::new().unwrap();
    let mut log = FrameLog::default();
    log.record(1, &ramp_frame(2, 2, 1));
    log.record(2, &ramp_frame(2, 2, 1));
    assert_eq!(log.len(), 2);

    let at = Local.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
    let path = log.write(dir.path(), 1, at).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], "FrameNumber,DateObs,DateMid");
    assert_eq!(lines[1], "1,2024-03-01T22:00:00.000,2024-03-01T22:00:00.005");
    assert_eq!(lines.len(), 3);
}

#[test]
fn test_empty_frame_log_has_header_only() {
    let dir = TempDir::new().unwrap();
    let at = Local.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap();
    let path = FrameLog::default().write(dir.path(), 9, at).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    assert_eq!(text.trim_end(), "FrameNumber,DateObs,DateMid");
}

// ---------------------------------------------------------------------------
// Memory and preview helpers
// ---------------------------------------------------------------------------

#[test]
fn test_memory_probes() {
    assert_eq!(FixedMemoryProbe(512.0).available_mb().unwrap(), 512.0);
    if let Ok(mb) = SystemMemoryProbe::new().available_mb() {
        assert!(mb > 0.0);
    }
}

#[test]
fn test_stretch_maps_black_and_white() {
    let stats = compute_exact(&[100, 110, 120, 130, 140, 5000], 16).unwrap();
    let stretch = Stretch::from_statistics(&stats);
    assert!(stretch.white > stretch.black);
    assert_eq!(stretch.apply(0), 0);
    assert_eq!(stretch.apply(u16::MAX), 255);
}
