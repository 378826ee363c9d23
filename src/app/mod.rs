pub mod config;

pub use config::{Config, DiscordConfig, LogWatchConfig, ServerConfig};
