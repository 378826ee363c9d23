//! Discord delivery over the REST API
//!
//! Messages go either to a channel through the bot token or to a webhook.
//! The player count is shown by renaming a voice channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use super::{EventSink, Notification};
use crate::status::PresenceSink;

/// Default Discord REST endpoint
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscordEmbed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// ISO 8601
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl From<&Notification> for DiscordEmbed {
    fn from(n: &Notification) -> Self {
        Self {
            title: n.title.clone(),
            description: n.description.clone(),
            color: n.color,
            author: n.author.as_ref().map(|a| EmbedAuthor {
                name: a.name.clone(),
                icon_url: a.icon_url.clone(),
            }),
            thumbnail: n.thumbnail.clone().map(|url| EmbedImage { url }),
            footer: n.footer.clone().map(|text| EmbedFooter { text }),
            timestamp: n.timestamp.to_rfc3339(),
        }
    }
}

/// Where messages are posted
#[derive(Debug, Clone)]
pub enum Destination {
    /// Text channel, authenticated with the bot token
    Channel { token: String, channel_id: u64 },
    /// Incoming webhook URL
    Webhook { url: String },
}

/// Sink posting embeds to Discord
#[derive(Debug, Clone)]
pub struct DiscordSink {
    client: Client,
    api_base: String,
    destination: Destination,
}

impl DiscordSink {
    pub fn new(destination: Destination) -> Self {
        Self::with_api_base(destination, DEFAULT_API_BASE)
    }

    pub fn with_api_base(destination: Destination, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            destination,
        }
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// URL messages are posted to
    pub fn message_url(&self) -> String {
        match &self.destination {
            Destination::Channel { channel_id, .. } => {
                format!("{}/channels/{}/messages", self.api_base, channel_id)
            }
            Destination::Webhook { url } => url.clone(),
        }
    }

    pub fn payload(notification: &Notification) -> DiscordMessage {
        DiscordMessage {
            content: None,
            embeds: vec![DiscordEmbed::from(notification)],
        }
    }

    async fn send_payload(&self, payload: &DiscordMessage) -> Result<()> {
        let mut request = self.client.post(self.message_url()).json(payload);
        if let Destination::Channel { token, .. } = &self.destination {
            request = request.header(reqwest::header::AUTHORIZATION, format!("Bot {}", token));
        }

        let response = request
            .send()
            .await
            .context("Failed to send Discord message")?;

        check_status(response, "Discord message").await
    }
}

#[async_trait]
impl EventSink for DiscordSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        self.send_payload(&Self::payload(notification)).await?;
        debug!(title = %notification.title, "Discord message sent");
        Ok(())
    }

    fn name(&self) -> &str {
        match self.destination {
            Destination::Channel { .. } => "discord-channel",
            Destination::Webhook { .. } => "discord-webhook",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChannelRename<'a> {
    name: &'a str,
}

/// Shows the player count as a voice channel name
#[derive(Debug, Clone)]
pub struct VoiceChannelPresence {
    client: Client,
    api_base: String,
    token: String,
    channel_id: u64,
}

impl VoiceChannelPresence {
    pub fn new(token: impl Into<String>, channel_id: u64) -> Self {
        Self::with_api_base(token, channel_id, DEFAULT_API_BASE)
    }

    pub fn with_api_base(token: impl Into<String>, channel_id: u64, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            channel_id,
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn channel_url(&self) -> String {
        format!("{}/channels/{}", self.api_base, self.channel_id)
    }
}

#[async_trait]
impl PresenceSink for VoiceChannelPresence {
    async fn show_player_count(&self, count: u32, max_players: u32) -> Result<()> {
        let name = super::render::player_count(count, max_players);
        let response = self
            .client
            .patch(self.channel_url())
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&ChannelRename { name: &name })
            .send()
            .await
            .context("Failed to rename voice channel")?;

        check_status(response, "Voice channel rename").await?;
        debug!(channel_id = self.channel_id, %name, "Voice channel renamed");
        Ok(())
    }
}

async fn check_status(response: reqwest::Response, what: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    error!(%status, %body, "{} rejected by Discord", what);
    anyhow::bail!("{} failed: {} - {}", what, status, body)
}
