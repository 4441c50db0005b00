//! Outbound notification seam.
//!
//! Delivery failures are contained per channel: a channel that cannot be
//! reached is logged and skipped, the remaining channels still receive the
//! message.

use async_trait::async_trait;
use tracing::{info, warn};
use warden_types::ChannelId;

use crate::error::MonitorResult;

/// A PNG attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingImage {
    pub filename: String,
    pub png: Vec<u8>,
}

impl OutgoingImage {
    pub fn png(filename: impl Into<String>, png: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            png,
        }
    }
}

/// Chat transport used for alerts and command replies.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Destination channels for broadcasts.
    fn channels(&self) -> Vec<ChannelId>;

    async fn send_text(&self, channel: &ChannelId, text: &str) -> MonitorResult<()>;

    async fn send_image(
        &self,
        channel: &ChannelId,
        image: &OutgoingImage,
        caption: &str,
    ) -> MonitorResult<()>;
}

/// Send `text` to every destination channel. Returns the number of channels
/// that accepted it.
pub async fn broadcast_text(notifier: &dyn Notifier, text: &str) -> usize {
    let mut delivered = 0;
    for channel in notifier.channels() {
        match notifier.send_text(&channel, text).await {
            Ok(()) => {
                delivered += 1;
                info!(%channel, "Message delivered");
            }
            Err(e) => warn!(%channel, error = %e, "Message delivery failed"),
        }
    }
    delivered
}

/// Send an image with caption to every destination channel.
pub async fn broadcast_image(notifier: &dyn Notifier, image: &OutgoingImage, caption: &str) -> usize {
    let mut delivered = 0;
    for channel in notifier.channels() {
        match notifier.send_image(&channel, image, caption).await {
            Ok(()) => {
                delivered += 1;
                info!(%channel, file = %image.filename, "Image delivered");
            }
            Err(e) => warn!(%channel, error = %e, "Image delivery failed"),
        }
    }
    delivered
}

/// Notifier that only logs, for dry runs.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    channels: Vec<ChannelId>,
}

impl LogNotifier {
    pub fn new(channels: Vec<ChannelId>) -> Self {
        Self { channels }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn channels(&self) -> Vec<ChannelId> {
        self.channels.clone()
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> MonitorResult<()> {
        info!(%channel, "[dry-run] text:\n{}", text);
        Ok(())
    }

    async fn send_image(
        &self,
        channel: &ChannelId,
        image: &OutgoingImage,
        caption: &str,
    ) -> MonitorResult<()> {
        info!(
            %channel,
            file = %image.filename,
            bytes = image.png.len(),
            "[dry-run] image: {}",
            caption
        );
        Ok(())
    }
}
