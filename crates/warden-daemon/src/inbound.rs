//! Inbound command polling.
//!
//! Each watched channel keeps a cursor at the newest message seen. The first
//! poll of a channel only places the cursor so history is never replayed;
//! later polls read everything after it, oldest first, and answer commands in
//! the channel they came from.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use warden_monitor::{CommandRouter, Notifier};
use warden_types::ChannelId;

use crate::error::DaemonResult;

/// Messages per poll; Discord's maximum page size.
const PAGE_SIZE: u8 = 100;

/// A chat message read from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Snowflake id, increasing over time
    pub id: String,
    pub channel: ChannelId,
    pub content: String,
    /// Authored by a bot account (including this one)
    pub from_bot: bool,
}

/// Reads recent messages from a channel.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Messages newer than `after`, or the latest ones when `after` is `None`.
    async fn fetch_messages(
        &self,
        channel: &ChannelId,
        after: Option<&str>,
        limit: u8,
    ) -> DaemonResult<Vec<InboundMessage>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Unset,
    /// Channel was empty when the cursor was placed.
    Start,
    After(String),
}

impl Cursor {
    fn as_after(&self) -> Option<&str> {
        match self {
            Cursor::Unset => None,
            Cursor::Start => Some("0"),
            Cursor::After(id) => Some(id),
        }
    }
}

/// Snowflakes compare numerically; equal-length decimal strings compare
/// lexically.
fn snowflake_cmp(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Polls channels for commands and replies through the notifier.
pub struct CommandPoller {
    source: Arc<dyn MessageSource>,
    notifier: Arc<dyn Notifier>,
    router: CommandRouter,
    channels: Vec<ChannelId>,
    interval: Duration,
    cursors: HashMap<ChannelId, Cursor>,
}

impl CommandPoller {
    pub fn new(
        source: Arc<dyn MessageSource>,
        notifier: Arc<dyn Notifier>,
        router: CommandRouter,
        channels: Vec<ChannelId>,
        interval: Duration,
    ) -> Self {
        let cursors = channels
            .iter()
            .map(|c| (c.clone(), Cursor::Unset))
            .collect();
        Self {
            source,
            notifier,
            router,
            channels,
            interval,
            cursors,
        }
    }

    /// Poll until `shutdown` flips to true.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            channels = self.channels.len(),
            prefix = %self.router.prefix(),
            "Command poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    self.poll_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Command poller stopped");
    }

    /// Poll every channel once. Returns the number of commands answered.
    pub async fn poll_once(&mut self) -> usize {
        let mut answered = 0;
        for channel in self.channels.clone() {
            match self.poll_channel(&channel).await {
                Ok(n) => answered += n,
                Err(e) => warn!(%channel, error = %e, "Command poll failed"),
            }
        }
        answered
    }

    async fn poll_channel(&mut self, channel: &ChannelId) -> DaemonResult<usize> {
        let cursor = self.cursors.get(channel).cloned().unwrap_or(Cursor::Unset);

        if cursor == Cursor::Unset {
            let latest = self.source.fetch_messages(channel, None, 1).await?;
            let placed = latest
                .into_iter()
                .map(|m| m.id)
                .max_by(|a, b| snowflake_cmp(a, b))
                .map_or(Cursor::Start, Cursor::After);
            debug!(%channel, cursor = ?placed, "Command cursor placed");
            self.cursors.insert(channel.clone(), placed);
            return Ok(0);
        }

        let mut messages = self
            .source
            .fetch_messages(channel, cursor.as_after(), PAGE_SIZE)
            .await?;
        messages.sort_by(|a, b| snowflake_cmp(&a.id, &b.id));

        let mut answered = 0;
        for message in messages {
            self.cursors
                .insert(channel.clone(), Cursor::After(message.id.clone()));
            if message.from_bot {
                continue;
            }

            if let Some(reply) = self.router.handle(&message.content).await {
                answered += 1;
                if let Err(e) = self.notifier.send_text(channel, &reply).await {
                    warn!(%channel, error = %e, "Command reply failed");
                }
            }
        }
        Ok(answered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use warden_monitor::{MemoryBackend, MismatchView, MonitorResult, OutgoingImage, StatsStore};

    #[derive(Default)]
    struct FakeChannel {
        messages: Mutex<Vec<InboundMessage>>,
        requests: Mutex<Vec<Option<String>>>,
    }

    impl FakeChannel {
        fn post(&self, id: &str, content: &str, from_bot: bool) {
            self.messages.lock().unwrap().push(InboundMessage {
                id: id.to_string(),
                channel: ChannelId::new("c1"),
                content: content.to_string(),
                from_bot,
            });
        }
    }

    #[async_trait]
    impl MessageSource for FakeChannel {
        async fn fetch_messages(
            &self,
            _channel: &ChannelId,
            after: Option<&str>,
            limit: u8,
        ) -> DaemonResult<Vec<InboundMessage>> {
            self.requests
                .lock()
                .unwrap()
                .push(after.map(str::to_string));
            let mut all = self.messages.lock().unwrap().clone();
            // Newest first, like Discord.
            all.sort_by(|a, b| snowflake_cmp(&b.id, &a.id));
            let selected: Vec<_> = match after {
                Some(after) => all
                    .into_iter()
                    .filter(|m| snowflake_cmp(&m.id, after) == Ordering::Greater)
                    .collect(),
                None => all,
            };
            Ok(selected.into_iter().take(limit as usize).collect())
        }
    }

    #[derive(Default)]
    struct Replies(Mutex<Vec<(ChannelId, String)>>);

    #[async_trait]
    impl Notifier for Replies {
        fn channels(&self) -> Vec<ChannelId> {
            Vec::new()
        }

        async fn send_text(&self, channel: &ChannelId, text: &str) -> MonitorResult<()> {
            self.0
                .lock()
                .unwrap()
                .push((channel.clone(), text.to_string()));
            Ok(())
        }

        async fn send_image(
            &self,
            _channel: &ChannelId,
            _image: &OutgoingImage,
            _caption: &str,
        ) -> MonitorResult<()> {
            Ok(())
        }
    }

    async fn poller(source: Arc<FakeChannel>, replies: Arc<Replies>) -> CommandPoller {
        let stats = Arc::new(StatsStore::open(Arc::new(MemoryBackend::new())).await.unwrap());
        let router = CommandRouter::new(stats, MismatchView::default(), "!");
        CommandPoller::new(
            source,
            replies,
            router,
            vec![ChannelId::new("c1")],
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_snowflake_ordering() {
        assert_eq!(snowflake_cmp("9", "10"), Ordering::Less);
        assert_eq!(snowflake_cmp("120", "119"), Ordering::Greater);
        assert_eq!(snowflake_cmp("42", "42"), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_first_poll_does_not_replay_history() {
        let source = Arc::new(FakeChannel::default());
        let replies = Arc::new(Replies::default());
        source.post("100", "!rank", false);
        let mut poller = poller(source.clone(), replies.clone()).await;

        assert_eq!(poller.poll_once().await, 0);
        assert!(replies.0.lock().unwrap().is_empty());

        source.post("101", "!errorPixels", false);
        assert_eq!(poller.poll_once().await, 1);

        let sent = replies.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, ChannelId::new("c1"));
        assert_eq!(
            source.requests.lock().unwrap().clone(),
            vec![None, Some("100".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_channel_starts_from_beginning() {
        let source = Arc::new(FakeChannel::default());
        let replies = Arc::new(Replies::default());
        let mut poller = poller(source.clone(), replies.clone()).await;

        poller.poll_once().await;
        source.post("5", "!rank", false);
        assert_eq!(poller.poll_once().await, 1);
        assert_eq!(
            source.requests.lock().unwrap().last().cloned().flatten(),
            Some("0".to_string())
        );
    }

    #[tokio::test]
    async fn test_ignores_bots_and_chatter() {
        let source = Arc::new(FakeChannel::default());
        let replies = Arc::new(Replies::default());
        let mut poller = poller(source.clone(), replies.clone()).await;
        poller.poll_once().await;

        source.post("7", "!rank", true);
        source.post("8", "hello there", false);
        source.post("9", "!rm", false);
        assert_eq!(poller.poll_once().await, 0);

        // Cursor advanced past the ignored messages.
        source.post("10", "!rm 42", false);
        assert_eq!(poller.poll_once().await, 1);
        assert_eq!(
            source.requests.lock().unwrap().last().cloned().flatten(),
            Some("9".to_string())
        );
        let sent = replies.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("42"));
    }
}
