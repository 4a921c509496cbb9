/// Thread-safe progress reporting for a capture run.
///
/// Implementors can use this to drive progress bars or logging. All methods
/// have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A run has started; `total_frames` is the frame target.
    fn begin(&self, _run_id: u32, _total_frames: u32) {}

    /// `frames_done` frames have been counted toward the target.
    fn advance(&self, _frames_done: u32) {}

    /// The run is over.
    fn finish(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
