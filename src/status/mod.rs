//! Live player count from the game server's Steam query port

pub mod a2s;
pub mod refresher;

use anyhow::Result;
use async_trait::async_trait;

pub use a2s::A2sClient;
pub use refresher::{PlayerCountRefresher, RefresherConfig};

/// Source of the current player count
#[async_trait]
pub trait PlayerCountSource: Send + Sync {
    async fn player_count(&self) -> Result<u32>;
}

/// Where the player count is shown
#[async_trait]
pub trait PresenceSink: Send + Sync {
    async fn show_player_count(&self, count: u32, max_players: u32) -> Result<()>;
}
