use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{LuckyError, Result};

use super::source::FrameSource;

/// Poll until the camera reports connected again.
///
/// Some cameras drop off the bus for a moment after a burst. There is no
/// timeout; only `cancel` ends a wait for a camera that never comes back.
pub async fn wait_for_reconnect(
    source: &dyn FrameSource,
    poll: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut polls = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(LuckyError::Cancelled),
            _ = tokio::time::sleep(poll) => {}
        }
        if source.is_connected().await {
            if polls > 0 {
                debug!(polls, "Camera reconnected");
            }
            return Ok(());
        }
        polls += 1;
    }
}
