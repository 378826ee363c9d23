use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::announce::discord::{Destination, DEFAULT_API_BASE};
use crate::logwatch::{ExtractorConfig, LogWatcherConfig};
use crate::status::refresher::DEFAULT_PRESENCE_TIMEOUT;
use crate::status::RefresherConfig;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logwatch: LogWatchConfig,
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logwatch: LogWatchConfig::default(),
            discord: DiscordConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Server log watching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogWatchConfig {
    /// Valheim dedicated server log file
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// Modification time polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Lines read from the end of the file per change
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    /// Handshakes that may wait for their character line at once
    #[serde(default = "default_pending_capacity")]
    pub pending_capacity: usize,
    /// Death lines remembered for de-duplication
    #[serde(default = "default_death_memory")]
    pub death_memory: usize,
    /// Skip lines already seen in the previous tail window
    #[serde(default = "default_skip_overlap")]
    pub skip_overlap: bool,
    /// Per-message delivery timeout in seconds (0 = no timeout)
    #[serde(default = "default_delivery_timeout")]
    pub delivery_timeout_secs: u64,
}

fn default_log_file() -> PathBuf {
    PathBuf::from("valheim_server.log")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_tail_lines() -> usize {
    crate::logwatch::tail::DEFAULT_TAIL_LINES
}

fn default_pending_capacity() -> usize {
    crate::logwatch::session::DEFAULT_PENDING_CAPACITY
}

fn default_death_memory() -> usize {
    crate::logwatch::dedup::DEFAULT_CAPACITY
}

fn default_skip_overlap() -> bool {
    true
}

fn default_delivery_timeout() -> u64 {
    10
}

impl Default for LogWatchConfig {
    fn default() -> Self {
        Self {
            log_file: default_log_file(),
            poll_interval_ms: default_poll_interval_ms(),
            tail_lines: default_tail_lines(),
            pending_capacity: default_pending_capacity(),
            death_memory: default_death_memory(),
            skip_overlap: default_skip_overlap(),
            delivery_timeout_secs: default_delivery_timeout(),
        }
    }
}

impl LogWatchConfig {
    pub fn delivery_timeout(&self) -> Option<Duration> {
        (self.delivery_timeout_secs > 0).then(|| Duration::from_secs(self.delivery_timeout_secs))
    }

    pub fn to_watcher_config(&self) -> LogWatcherConfig {
        LogWatcherConfig {
            log_file: self.log_file.clone(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            tail_lines: self.tail_lines,
            skip_overlap: self.skip_overlap,
            delivery_timeout: self.delivery_timeout(),
            extractor: self.to_extractor_config(),
        }
    }

    pub fn to_extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            pending_capacity: self.pending_capacity,
            death_memory: self.death_memory,
        }
    }
}

/// Discord credentials and channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token
    #[serde(default)]
    pub token: Option<String>,
    /// Channel receiving player announcements
    #[serde(default)]
    pub text_channel_id: Option<u64>,
    /// Voice channel renamed to show the player count
    #[serde(default)]
    pub voice_channel_id: Option<u64>,
    /// Webhook used instead of the bot token for announcements
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Author of the startup message
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Icon shown on startup and error messages
    #[serde(default)]
    pub icon_url: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_bot_name() -> String {
    "Valheim Log Bot".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            text_channel_id: None,
            voice_channel_id: None,
            webhook_url: None,
            api_base: default_api_base(),
            bot_name: default_bot_name(),
            icon_url: None,
        }
    }
}

impl DiscordConfig {
    /// Announcement destination; the webhook wins when both are configured
    pub fn destination(&self) -> Option<Destination> {
        if let Some(url) = self.webhook_url.as_ref().filter(|u| !u.is_empty()) {
            return Some(Destination::Webhook { url: url.clone() });
        }
        match (&self.token, self.text_channel_id) {
            (Some(token), Some(channel_id)) if !token.is_empty() => Some(Destination::Channel {
                token: token.clone(),
                channel_id,
            }),
            _ => None,
        }
    }

    /// Token and voice channel, if the player count can be shown
    pub fn voice_channel(&self) -> Option<(String, u64)> {
        match (&self.token, self.voice_channel_id) {
            (Some(token), Some(channel_id)) if !token.is_empty() => Some((token.clone(), channel_id)),
            _ => None,
        }
    }
}

/// Game server query settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Enable the periodic player count refresh
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    /// Display name used in error reports
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Steam query port (game port + 1)
    #[serde(default = "default_query_port")]
    pub query_port: u16,
    /// Query timeout for the periodic refresh in milliseconds
    #[serde(default = "default_query_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// Query timeout for the `online` command in seconds
    #[serde(default = "default_online_timeout")]
    pub online_timeout_secs: u64,
}

fn default_server_enabled() -> bool {
    true
}

fn default_server_name() -> String {
    "Valheim".to_string()
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_query_port() -> u16 {
    2457
}

fn default_query_timeout_ms() -> u64 {
    3000
}

fn default_refresh_interval() -> u64 {
    5
}

fn default_max_players() -> u32 {
    10
}

fn default_online_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            name: default_server_name(),
            host: default_server_host(),
            query_port: default_query_port(),
            timeout_ms: default_query_timeout_ms(),
            refresh_interval_secs: default_refresh_interval(),
            max_players: default_max_players(),
            online_timeout_secs: default_online_timeout(),
        }
    }
}

/// Values taken from the command line or the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub log_file: Option<PathBuf>,
    pub token: Option<String>,
    pub text_channel_id: Option<u64>,
    pub voice_channel_id: Option<u64>,
    pub webhook_url: Option<String>,
    pub server_host: Option<String>,
    pub server_query_port: Option<u16>,
}

impl Config {
    /// Load from `path`, or from the default location.
    /// A missing file is created with the default settings.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            Self::from_toml(&content)
        } else {
            let config = Self::default();
            if let Err(e) = config.save(&config_path) {
                tracing::warn!("Failed to save default config: {}", e);
            }
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))
    }

    /// ~/.config/valheim-log-bot/config.toml
    pub fn config_path() -> Result<PathBuf> {
        let base_dirs = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))?;
        Ok(base_dirs.home_dir().join(".config/valheim-log-bot/config.toml"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(log_file) = overrides.log_file {
            self.logwatch.log_file = log_file;
        }
        if let Some(token) = overrides.token {
            self.discord.token = Some(token);
        }
        if let Some(id) = overrides.text_channel_id {
            self.discord.text_channel_id = Some(id);
        }
        if let Some(id) = overrides.voice_channel_id {
            self.discord.voice_channel_id = Some(id);
        }
        if let Some(url) = overrides.webhook_url {
            self.discord.webhook_url = Some(url);
        }
        if let Some(host) = overrides.server_host {
            self.server.host = host;
        }
        if let Some(port) = overrides.server_query_port {
            self.server.query_port = port;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let lw = &self.logwatch;
        if lw.tail_lines == 0 {
            bail!("logwatch.tail_lines must be at least 1");
        }
        if lw.poll_interval_ms == 0 {
            bail!("logwatch.poll_interval_ms must be at least 1");
        }
        if lw.pending_capacity == 0 {
            bail!("logwatch.pending_capacity must be at least 1");
        }
        if lw.death_memory < lw.tail_lines {
            bail!(
                "logwatch.death_memory ({}) must not be smaller than logwatch.tail_lines ({})",
                lw.death_memory,
                lw.tail_lines
            );
        }
        if self.server.enabled && self.server.refresh_interval_secs == 0 {
            bail!("server.refresh_interval_secs must be at least 1");
        }
        Ok(())
    }

    pub fn to_refresher_config(&self) -> RefresherConfig {
        RefresherConfig {
            interval: Duration::from_secs(self.server.refresh_interval_secs),
            max_players: self.server.max_players,
            server_name: self.server.name.clone(),
            icon_url: self.discord.icon_url.clone(),
            delivery_timeout: self.logwatch.delivery_timeout(),
            presence_timeout: self.logwatch.delivery_timeout().unwrap_or(DEFAULT_PRESENCE_TIMEOUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.logwatch.tail_lines, 5);
        assert_eq!(config.logwatch.poll_interval_ms, 100);
        assert_eq!(config.logwatch.pending_capacity, 1);
        assert_eq!(config.server.query_port, 2457);
        assert_eq!(config.server.refresh_interval_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [logwatch]
            log_file = "/srv/valheim/server.log"
            tail_lines = 10

            [discord]
            token = "abc"
            text_channel_id = 123
            "#,
        )
        .unwrap();

        assert_eq!(config.logwatch.log_file, PathBuf::from("/srv/valheim/server.log"));
        assert_eq!(config.logwatch.tail_lines, 10);
        assert_eq!(config.logwatch.death_memory, 256);
        assert_eq!(config.server.max_players, 10);
        assert!(matches!(
            config.discord.destination(),
            Some(Destination::Channel { channel_id: 123, .. })
        ));
    }

    #[test]
    fn test_webhook_preferred_over_channel() {
        let discord = DiscordConfig {
            token: Some("abc".into()),
            text_channel_id: Some(1),
            webhook_url: Some("https://discord.com/api/webhooks/1/x".into()),
            ..Default::default()
        };
        assert!(matches!(discord.destination(), Some(Destination::Webhook { .. })));
        assert!(DiscordConfig::default().destination().is_none());
        assert!(discord.voice_channel().is_none());
    }

    #[test]
    fn test_validate_rejects_small_death_memory() {
        let mut config = Config::default();
        config.logwatch.death_memory = 2;
        assert!(config.validate().is_err());

        config.logwatch.death_memory = 256;
        config.logwatch.tail_lines = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply(ConfigOverrides {
            log_file: Some(PathBuf::from("/tmp/server.log")),
            voice_channel_id: Some(9),
            server_query_port: Some(2459),
            ..Default::default()
        });
        assert_eq!(config.logwatch.log_file, PathBuf::from("/tmp/server.log"));
        assert_eq!(config.discord.voice_channel_id, Some(9));
        assert_eq!(config.server.query_port, 2459);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let config = Config::load(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.logwatch.tail_lines, 5);

        let reloaded = Config::load(Some(&path)).unwrap();
        assert_eq!(reloaded.logwatch.tail_lines, config.logwatch.tail_lines);
    }

    #[test]
    fn test_watcher_config_conversion() {
        let mut config = Config::default();
        config.logwatch.delivery_timeout_secs = 0;
        let watcher = config.logwatch.to_watcher_config();
        assert_eq!(watcher.poll_interval, Duration::from_millis(100));
        assert!(watcher.delivery_timeout.is_none());
        assert_eq!(watcher.extractor.death_memory, 256);
    }
}
