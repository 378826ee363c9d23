//! Message texts and colors

use super::Notification;
use crate::logwatch::PlayerEvent;

pub mod colors {
    /// Player log and status messages
    pub const INFO: u32 = 0x0099FF;
    /// Errors
    pub const ERROR: u32 = 0xFF0000;
}

const PLAYER_LOG: &str = "Player Log";
const UNKNOWN_PLAYER: &str = "Unknown player";

pub fn player_event(event: &PlayerEvent) -> Notification {
    let title = match event {
        PlayerEvent::PlayerConnected { name } => format!("{} just connected to the server!", name),
        PlayerEvent::PlayerDisconnected { name } => format!(
            "{} just disconnected from the server!",
            name.as_deref().unwrap_or(UNKNOWN_PLAYER)
        ),
        PlayerEvent::PlayerDied { name } => format!("{} just died! 💀", name),
    };

    Notification::new(title, colors::INFO).with_author(PLAYER_LOG, None)
}

/// Startup announcement
pub fn bot_online(bot_name: &str, icon_url: Option<&str>) -> Notification {
    Notification::new("Bot online", colors::INFO)
        .with_author(bot_name, icon_url.map(str::to_string))
        .with_description("Bot is online and ready to serve.")
        .with_thumbnail(icon_url.map(str::to_string))
}

/// Failure report, e.g. the game server did not answer
pub fn error(source: &str, message: &str, icon_url: Option<&str>) -> Notification {
    Notification::new("Error", colors::ERROR)
        .with_author(source, icon_url.map(str::to_string))
        .with_description(message)
        .with_thumbnail(icon_url.map(str::to_string))
}

/// Voice channel name showing the player count
pub fn player_count(count: u32, max_players: u32) -> String {
    format!("🎮 In-Game: {} / {}", count, max_players)
}

/// Reply of the `online` command
pub fn online_reply(count: u32) -> String {
    format!("There are {} players in the server", count)
}
