use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use valheim_log_bot::announce::discord::Destination;
use valheim_log_bot::announce::{deliver_async, render, ConsoleSink, DiscordSink, EventSink, VoiceChannelPresence};
use valheim_log_bot::app::config::ConfigOverrides;
use valheim_log_bot::app::Config;
use valheim_log_bot::logwatch::{decode_lines, LogEventExtractor, LogWatcher};
use valheim_log_bot::status::{A2sClient, PlayerCountRefresher, PresenceSink};

/// Valheim Log Bot - announces Valheim server player events on Discord
#[derive(Parser)]
#[command(name = "valheim-log-bot")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Config file (defaults to ~/.config/valheim-log-bot/config.toml)
    #[arg(short, long, env = "VALHEIM_BOT_CONFIG")]
    config: Option<PathBuf>,

    /// Also write logs to a file in the data directory
    #[arg(long)]
    log_to_file: bool,

    #[command(flatten)]
    overrides: OverrideArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct OverrideArgs {
    /// Server log file to watch
    #[arg(long, env = "LOG_FILE", global = true)]
    log_file: Option<PathBuf>,
    /// Discord bot token
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,
    /// Channel receiving player announcements
    #[arg(long, env = "TEXT_CHANNEL_ID", global = true)]
    text_channel_id: Option<u64>,
    /// Voice channel showing the player count
    #[arg(long, env = "VOICE_CHANNEL_ID", global = true)]
    voice_channel_id: Option<u64>,
    /// Webhook used for announcements instead of the bot token
    #[arg(long, env = "DISCORD_WEBHOOK_URL", hide_env_values = true, global = true)]
    webhook_url: Option<String>,
    /// Game server host
    #[arg(long, env = "SERVER_HOST", global = true)]
    server_host: Option<String>,
    /// Game server Steam query port
    #[arg(long, env = "SERVER_QUERY_PORT", global = true)]
    server_query_port: Option<u16>,
}

impl From<OverrideArgs> for ConfigOverrides {
    fn from(args: OverrideArgs) -> Self {
        Self {
            log_file: args.log_file,
            token: args.token,
            text_channel_id: args.text_channel_id,
            voice_channel_id: args.voice_channel_id,
            webhook_url: args.webhook_url,
            server_host: args.server_host,
            server_query_port: args.server_query_port,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the server log and announce player events (default)
    Run {
        /// Write notifications to the log instead of Discord
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the number of players currently online
    Online,
    /// Run a whole log file through the extractor and print the events
    Replay {
        /// Log file to replay
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_to_file)?;

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(cli.overrides.into());
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Some(Commands::Online) => runtime.block_on(run_online(&config)),
        Some(Commands::Replay { file }) => run_replay(&config, &file),
        Some(Commands::Run { dry_run }) => runtime.block_on(run_bot(config, dry_run)),
        None => runtime.block_on(run_bot(config, false)),
    }
}

fn init_logging(level: &str, log_to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = if log_to_file {
        let log_dir = directories::ProjectDirs::from("", "", "valheim-log-bot")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("valheim-log-bot"));

        std::fs::create_dir_all(&log_dir)?;
        let log_file = std::fs::File::create(log_dir.join("valheim-log-bot.log"))?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(log_file),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    info!("Valheim Log Bot starting");
    Ok(())
}

async fn run_bot(config: Config, dry_run: bool) -> Result<()> {
    let delivery_timeout = config.logwatch.delivery_timeout();

    let (sink, presence): (Arc<dyn EventSink>, Arc<dyn PresenceSink>) = if dry_run {
        info!("Dry run, notifications are only logged");
        let sink: Arc<dyn EventSink> = Arc::new(ConsoleSink);
        let presence: Arc<dyn PresenceSink> = Arc::new(ConsoleSink);
        (sink, presence)
    } else {
        let destination = config.discord.destination().context(
            "No Discord destination configured (set DISCORD_TOKEN and TEXT_CHANNEL_ID, or DISCORD_WEBHOOK_URL)",
        )?;
        if let Destination::Webhook { .. } = destination {
            info!("Posting announcements through the webhook");
        }
        let sink: Arc<dyn EventSink> =
            Arc::new(DiscordSink::with_api_base(destination, config.discord.api_base.clone()));

        let presence: Arc<dyn PresenceSink> = match config.discord.voice_channel() {
            Some((token, channel_id)) => Arc::new(VoiceChannelPresence::with_api_base(
                token,
                channel_id,
                config.discord.api_base.clone(),
            )),
            None => {
                warn!("No voice channel configured, player count is only logged");
                Arc::new(ConsoleSink)
            }
        };
        (sink, presence)
    };

    deliver_async(
        Arc::clone(&sink),
        render::bot_online(&config.discord.bot_name, config.discord.icon_url.as_deref()),
        delivery_timeout,
    );

    let refresher = if config.server.enabled {
        let client = A2sClient::new(
            &config.server.host,
            config.server.query_port,
            Duration::from_millis(config.server.timeout_ms),
        );
        info!(address = client.address(), "Querying game server for player count");
        let refresher = PlayerCountRefresher::new(
            config.to_refresher_config(),
            Arc::new(client),
            presence,
            Arc::clone(&sink),
        );
        Some(tokio::spawn(refresher.run()))
    } else {
        None
    };

    let watcher = LogWatcher::new(config.logwatch.to_watcher_config())?;

    let result = tokio::select! {
        result = watcher.run(sink) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    if let Some(handle) = refresher {
        handle.abort();
    }

    result
}

async fn run_online(config: &Config) -> Result<()> {
    let client = A2sClient::new(
        &config.server.host,
        config.server.query_port,
        Duration::from_secs(config.server.online_timeout_secs),
    );
    let count = client
        .query_player_count()
        .await
        .with_context(|| format!("Failed to query {}", client.address()))?;
    println!("{}", render::online_reply(count));
    Ok(())
}

fn run_replay(config: &Config, file: &std::path::Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let mut extractor = LogEventExtractor::new(config.logwatch.to_extractor_config())?;
    let events = extractor.process_lines(decode_lines(&bytes));

    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    info!(
        events = events.len(),
        open_sessions = extractor.sessions().len(),
        "Replay finished"
    );
    Ok(())
}
