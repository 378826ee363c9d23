//! Periodic player-count refresh

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{PlayerCountSource, PresenceSink};
use crate::announce::{deliver_async, render, EventSink};

#[derive(Debug, Clone)]
pub struct RefresherConfig {
    pub interval: Duration,
    pub max_players: u32,
    /// Author line of error reports
    pub server_name: String,
    pub icon_url: Option<String>,
    pub delivery_timeout: Option<Duration>,
    /// Upper bound for one presence update so a stalled request can't stop refreshing
    pub presence_timeout: Duration,
}

pub const DEFAULT_PRESENCE_TIMEOUT: Duration = Duration::from_secs(10);

impl Default for RefresherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_players: 10,
            server_name: "Valheim".to_string(),
            icon_url: None,
            delivery_timeout: Some(Duration::from_secs(10)),
            presence_timeout: DEFAULT_PRESENCE_TIMEOUT,
        }
    }
}

/// Polls the player count and shows it whenever it changes.
///
/// A failed query is reported to the notification sink once per outage;
/// further failures are only logged until a query succeeds again.
pub struct PlayerCountRefresher {
    config: RefresherConfig,
    source: Arc<dyn PlayerCountSource>,
    presence: Arc<dyn PresenceSink>,
    sink: Arc<dyn EventSink>,
    last_shown: Option<u32>,
    failing: bool,
}

impl PlayerCountRefresher {
    pub fn new(
        config: RefresherConfig,
        source: Arc<dyn PlayerCountSource>,
        presence: Arc<dyn PresenceSink>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            source,
            presence,
            sink,
            last_shown: None,
            failing: false,
        }
    }

    /// One refresh round
    pub async fn tick(&mut self) {
        let count = match self.source.player_count().await {
            Ok(count) => count,
            Err(e) => {
                warn!("Player count query failed: {:#}", e);
                if !self.failing {
                    self.failing = true;
                    let notification = render::error(
                        &self.config.server_name,
                        &format!("{:#}", e),
                        self.config.icon_url.as_deref(),
                    );
                    deliver_async(Arc::clone(&self.sink), notification, self.config.delivery_timeout);
                }
                return;
            }
        };

        if self.failing {
            info!("Player count query recovered");
            self.failing = false;
        }

        if self.last_shown == Some(count) {
            debug!(count, "Player count unchanged");
            return;
        }

        let update = self.presence.show_player_count(count, self.config.max_players);
        match tokio::time::timeout(self.config.presence_timeout, update).await {
            Ok(Ok(())) => {
                info!(count, max_players = self.config.max_players, "Player count updated");
                self.last_shown = Some(count);
            }
            Ok(Err(e)) => warn!("Failed to show player count: {:#}", e),
            Err(_) => warn!(
                timeout_ms = self.config.presence_timeout.as_millis() as u64,
                "Showing player count timed out"
            ),
        }
    }

    pub fn last_shown(&self) -> Option<u32> {
        self.last_shown
    }

    pub fn is_failing(&self) -> bool {
        self.failing
    }

    /// Refresh on a fixed interval for the lifetime of the process
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Player count refresher started"
        );

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }
}
