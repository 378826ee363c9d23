//! Sink that only writes to the log, used for dry runs

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use super::{EventSink, Notification};
use crate::status::PresenceSink;

#[derive(Debug, Default, Clone)]
pub struct ConsoleSink;

#[async_trait]
impl EventSink for ConsoleSink {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        info!(
            description = notification.description.as_deref().unwrap_or(""),
            "[notification] {}",
            notification.title
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "console"
    }
}

#[async_trait]
impl PresenceSink for ConsoleSink {
    async fn show_player_count(&self, count: u32, max_players: u32) -> Result<()> {
        info!("[presence] {}", super::render::player_count(count, max_players));
        Ok(())
    }
}
