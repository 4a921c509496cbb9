use console::Style;
use lucky_core::capture::{CaptureConfig, CaptureReport};
use lucky_core::io::SaveFormat;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().red().bold(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_capture_summary(config: &CaptureConfig, sensor: (u32, u32), runs: u32) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Lucky Capture"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(13)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Format"),
        s.method.apply_to(config.save_format)
    );
    if config.save_format == SaveFormat::Ser {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Byte order"),
            s.value.apply_to(format!("{:?}", config.ser_byte_order))
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Sensor"),
        s.value.apply_to(format!("{}x{}", sensor.0, sensor.1))
    );
    println!();

    println!("  {}", s.header.apply_to("Exposure"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Time"),
        s.value.apply_to(format!("{} s", config.exposure_seconds))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(format!("{} x {} run(s)", config.total_frames, runs))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("ROI"),
        s.value.apply_to(config.roi)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Binning"),
        s.value.apply_to(format!("{}x{}", config.binning.x, config.binning.y))
    );
    println!();

    if config.tracking.follow_target {
        println!("  {}", s.header.apply_to("Tracking"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Threshold"),
            s.value.apply_to(config.tracking.target_pixel_threshold)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Refresh"),
            s.value
                .apply_to(format!("{} ms", config.tracking.refresh_interval_ms))
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Tracking"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();

    if config.min_available_memory_mb > 0.0 {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Memory"),
            s.value
                .apply_to(format!("keep {:.0} MB free", config.min_available_memory_mb))
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Memory"),
            s.disabled.apply_to("unchecked")
        );
    }
    println!();
}

pub fn print_capture_report(report: &CaptureReport) {
    let s = Styles::new();

    println!();
    println!(
        "  {}",
        s.header.apply_to(format!("Run {}", report.run_id))
    );
    if let Some(ref path) = report.container_path {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Container"),
            s.path.apply_to(path.display())
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Written"),
        s.value.apply_to(format!(
            "{} of {} counted",
            report.frames_written, report.frames_counted
        ))
    );
    for (label, count) in [
        ("Dropped", report.frames_dropped),
        ("Filtered", report.frames_filtered),
        ("Skipped", report.frames_skipped),
    ] {
        if count > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to(label),
                s.disabled.apply_to(count)
            );
        }
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Rate"),
        s.value.apply_to(format!(
            "{:.2} fps over {:.1} s",
            report.fps,
            report.elapsed.as_secs_f64()
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Final ROI"),
        s.value.apply_to(report.roi)
    );
    if report.persisted_frames > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Previews"),
            s.value.apply_to(report.persisted_frames)
        );
    }
    if let Some(ref path) = report.frame_log_path {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Frame log"),
            s.path.apply_to(path.display())
        );
    }
    if report.aborted {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Status"),
            s.warning.apply_to("ended early")
        );
    }
    println!();
}
