//! Discord REST client.
//!
//! Outbound alerts go through `POST /channels/{id}/messages` (multipart for
//! images); inbound commands are read with `GET /channels/{id}/messages`.
//! Rate-limited requests (HTTP 429) are retried after the advertised delay.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use warden_monitor::report::{split_message, DISCORD_MESSAGE_LIMIT};
use warden_monitor::{MonitorError, MonitorResult, Notifier, OutgoingImage};
use warden_types::ChannelId;

use crate::error::{DaemonError, DaemonResult};
use crate::inbound::{InboundMessage, MessageSource};

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct RateLimited {
    retry_after: f64,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
    #[serde(default)]
    content: String,
    author: DiscordAuthor,
}

#[derive(Debug, Deserialize)]
struct DiscordAuthor {
    #[serde(default)]
    bot: bool,
}

/// Discord bot client over the REST API.
#[derive(Clone)]
pub struct DiscordClient {
    client: Client,
    api_base: String,
    token: String,
    channels: Vec<ChannelId>,
}

impl fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordClient")
            .field("api_base", &self.api_base)
            .field("channels", &self.channels)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        channels: Vec<ChannelId>,
        timeout: Duration,
    ) -> DaemonResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DaemonError::Discord(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channels,
        })
    }

    fn messages_url(&self, channel: &ChannelId) -> String {
        format!("{}/channels/{}/messages", self.api_base, channel)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bot {}", self.token))
    }

    /// Send a request built by `build`, retrying while Discord rate-limits it.
    async fn send<F>(&self, build: F) -> Result<Response, String>
    where
        F: Fn() -> Result<RequestBuilder, String>,
    {
        let mut retries = 0;
        loop {
            let response = self
                .authorize(build()?)
                .send()
                .await
                .map_err(|e| e.to_string())?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && retries < MAX_RATE_LIMIT_RETRIES {
                retries += 1;
                let wait = retry_delay(response).await;
                warn!(retries, wait_ms = wait.as_millis() as u64, "Rate limited by Discord");
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(format!("{} {}", status, body.trim()));
            }
            return Ok(response);
        }
    }

    async fn post_text(&self, channel: &ChannelId, text: &str) -> Result<(), String> {
        let url = self.messages_url(channel);
        self.send(|| Ok(self.client.post(&url).json(&json!({ "content": text }))))
            .await
            .map(|_| ())
    }
}

async fn retry_delay(response: Response) -> Duration {
    match response.json::<RateLimited>().await {
        Ok(body) if body.retry_after.is_finite() && body.retry_after >= 0.0 => {
            Duration::from_secs_f64(body.retry_after).min(MAX_RATE_LIMIT_WAIT)
        }
        _ => Duration::from_secs(1),
    }
}

fn notification_error(channel: &ChannelId, reason: String) -> MonitorError {
    MonitorError::Notification {
        channel: channel.clone(),
        reason,
    }
}

#[async_trait]
impl Notifier for DiscordClient {
    fn channels(&self) -> Vec<ChannelId> {
        self.channels.clone()
    }

    #[instrument(skip(self, text), fields(len = text.len()))]
    async fn send_text(&self, channel: &ChannelId, text: &str) -> MonitorResult<()> {
        for chunk in split_message(text, DISCORD_MESSAGE_LIMIT) {
            self.post_text(channel, &chunk)
                .await
                .map_err(|reason| notification_error(channel, reason))?;
        }
        Ok(())
    }

    #[instrument(skip(self, image, caption), fields(file = %image.filename))]
    async fn send_image(
        &self,
        channel: &ChannelId,
        image: &OutgoingImage,
        caption: &str,
    ) -> MonitorResult<()> {
        let mut chunks = split_message(caption, DISCORD_MESSAGE_LIMIT).into_iter();
        let content = chunks.next().unwrap_or_default();
        let payload = json!({
            "content": content,
            "attachments": [{ "id": 0, "filename": image.filename }],
        })
        .to_string();

        let url = self.messages_url(channel);
        self.send(|| {
            let file = Part::bytes(image.png.clone())
                .file_name(image.filename.clone())
                .mime_str("image/png")
                .map_err(|e| e.to_string())?;
            let form = Form::new()
                .text("payload_json", payload.clone())
                .part("files[0]", file);
            Ok(self.client.post(&url).multipart(form))
        })
        .await
        .map_err(|reason| notification_error(channel, reason))?;

        for chunk in chunks {
            self.post_text(channel, &chunk)
                .await
                .map_err(|reason| notification_error(channel, reason))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for DiscordClient {
    async fn fetch_messages(
        &self,
        channel: &ChannelId,
        after: Option<&str>,
        limit: u8,
    ) -> DaemonResult<Vec<InboundMessage>> {
        let url = self.messages_url(channel);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .send(|| Ok(self.client.get(&url).query(&query)))
            .await
            .map_err(|e| DaemonError::Discord(format!("reading channel {}: {}", channel, e)))?;
        let messages: Vec<DiscordMessage> = response
            .json()
            .await
            .map_err(|e| DaemonError::Discord(format!("malformed message list: {}", e)))?;

        debug!(%channel, count = messages.len(), "Fetched messages");
        Ok(messages
            .into_iter()
            .map(|m| InboundMessage {
                id: m.id,
                channel: channel.clone(),
                content: m.content,
                from_bot: m.author.bot,
            })
            .collect())
    }
}
