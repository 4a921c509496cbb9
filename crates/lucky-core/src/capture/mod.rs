pub mod config;
pub mod context;
pub mod frame_log;
pub mod memory;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod reconnect;
pub mod sink;
pub mod source;
pub mod synthetic;

pub use config::{CaptureConfig, FilterConfig, StatisticsConfig, TrackingConfig};
pub use context::RunContext;
pub use pipeline::{CapturePipeline, CaptureReport};
pub use progress::ProgressReporter;
pub use source::{FrameSource, LiveViewRequest};
