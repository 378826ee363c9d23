//! Announcements to the chat channel
//!
//! Events are rendered into [`Notification`]s and handed to an [`EventSink`].
//! Delivery is fire-and-forget: [`deliver_async`] spawns it and logs failures.

pub mod console;
pub mod discord;
pub mod render;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use console::ConsoleSink;
pub use discord::{DiscordSink, VoiceChannelPresence};

/// Embed author line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A rendered message: title plus optional color and icon metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub description: Option<String>,
    /// RGB color as an integer (0x0099FF)
    pub color: u32,
    pub author: Option<Author>,
    pub thumbnail: Option<String>,
    pub footer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            author: None,
            thumbnail: None,
            footer: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(Author {
            name: name.into(),
            icon_url,
        });
        self
    }

    pub fn with_thumbnail(mut self, url: Option<String>) -> Self {
        self.thumbnail = url;
        self
    }

    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

/// Destination for rendered notifications
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one notification
    async fn deliver(&self, notification: &Notification) -> Result<()>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Deliver a notification in the background.
///
/// The caller does not wait for the result. Failures and timeouts are logged
/// and otherwise dropped.
pub fn deliver_async(
    sink: Arc<dyn EventSink>,
    notification: Notification,
    timeout: Option<Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, sink.deliver(&notification)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("Delivery timed out after {:?}", limit)),
            },
            None => sink.deliver(&notification).await,
        };

        match result {
            Ok(()) => debug!(sink = sink.name(), title = %notification.title, "Notification delivered"),
            Err(e) => warn!(
                sink = sink.name(),
                title = %notification.title,
                "Failed to deliver notification: {:#}",
                e
            ),
        }
    })
}
