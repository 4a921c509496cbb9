use thiserror::Error;

#[derive(Error, Debug)]
pub enum LuckyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pixel count mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    #[error("Invalid container file: {0}")]
    InvalidContainer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: usize, total: usize },

    #[error("Empty pixel buffer")]
    EmptyFrame,

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Camera disconnected")]
    DeviceDisconnected,

    #[error("Capture cancelled")]
    Cancelled,

    #[error("Frame source error: {0}")]
    FrameSource(String),

    #[error("Frame log error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, LuckyError>;
