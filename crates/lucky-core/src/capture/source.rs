use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::frame::{Binning, Frame, Roi};

/// Parameters for starting a live-view stream.
#[derive(Clone, Debug, PartialEq)]
pub struct LiveViewRequest {
    pub exposure_seconds: f64,
    pub binning: Binning,
    /// Camera-side sub-sampling rectangle, if enabled.
    pub subsample: Option<Roi>,
}

/// A camera in live-view mode.
///
/// The stream yields frames in capture order and ends once `cancel` fires
/// or the camera stops delivering.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Full sensor dimensions (unbinned).
    fn sensor_size(&self) -> (u32, u32);

    fn live_view(
        &self,
        request: &LiveViewRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'static, Result<Frame>>;

    async fn is_connected(&self) -> bool;

    /// Move the camera's sub-sampling rectangle.
    async fn set_subsample(&self, roi: Roi) -> Result<()>;
}
