//! Event channel factories and handles.

use super::types::PublishTick;
use tokio::sync::mpsc;
use tracing::debug;

/// Default buffer size for event channels.
///
/// A full buffer already guarantees an upcoming cycle, so excess ticks can
/// be dropped.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Receiver handle for PublishTick events.
pub type PublishTickReceiver = mpsc::Receiver<PublishTick>;

/// Sender handle for PublishTick events.
///
/// Wraps the raw mpsc sender so that producers never block on a busy
/// scheduler.
#[derive(Debug, Clone)]
pub struct PublishTickSender {
    inner: mpsc::Sender<PublishTick>,
}

impl PublishTickSender {
    /// Queue a tick. Returns `false` if it was dropped.
    pub fn nudge(&self, tick: PublishTick) -> bool {
        match self.inner.try_send(tick) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "Publish tick dropped");
                false
            }
        }
    }
}

/// Create a new PublishTick channel.
pub fn publish_tick_channel() -> (PublishTickSender, PublishTickReceiver) {
    let (inner, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    (PublishTickSender { inner }, rx)
}
