//! Log file watcher
//!
//! Polls the log file's directory with a notify `PollWatcher` so a file
//! created after startup is picked up. Every change to the log file reads the
//! tail window, runs it through the extractor and hands the resulting events
//! to the sink without waiting for delivery.

use anyhow::{Context, Result};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::extractor::{ExtractorConfig, LogEventExtractor, PlayerEvent};
use super::tail::{read_last_lines, TailWindow, DEFAULT_TAIL_LINES};
use crate::announce::{deliver_async, render, EventSink};

/// Configuration for the log watcher
#[derive(Debug, Clone)]
pub struct LogWatcherConfig {
    /// Server log file to watch
    pub log_file: PathBuf,
    /// How often the file's modification time is checked
    pub poll_interval: Duration,
    /// Lines read from the end of the file per change
    pub tail_lines: usize,
    /// Only hand lines not seen in the previous window to the extractor
    pub skip_overlap: bool,
    /// Upper bound for a single delivery, unbounded if unset
    pub delivery_timeout: Option<Duration>,
    pub extractor: ExtractorConfig,
}

impl Default for LogWatcherConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("valheim.log"),
            poll_interval: Duration::from_millis(100),
            tail_lines: DEFAULT_TAIL_LINES,
            skip_overlap: true,
            delivery_timeout: Some(Duration::from_secs(10)),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// Watches the server log and announces player events
pub struct LogWatcher {
    config: LogWatcherConfig,
    extractor: LogEventExtractor,
    window: TailWindow,
}

impl LogWatcher {
    pub fn new(config: LogWatcherConfig) -> Result<Self> {
        let extractor = LogEventExtractor::new(config.extractor.clone())?;
        Ok(Self {
            config,
            extractor,
            window: TailWindow::new(),
        })
    }

    /// Read the current tail window and extract events from it
    pub fn poll_once(&mut self) -> Result<Vec<PlayerEvent>> {
        let lines = read_last_lines(&self.config.log_file, self.config.tail_lines)?;
        let lines = if self.config.skip_overlap {
            self.window.advance(lines)
        } else {
            lines
        };

        debug!(lines = lines.len(), "Processing log tail");
        Ok(self.extractor.process_lines(&lines))
    }

    /// Handle one file change. Read failures are logged and produce no events.
    /// Returns the number of deliveries started.
    pub fn handle_change(&mut self, sink: &Arc<dyn EventSink>) -> usize {
        let events = match self.poll_once() {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to read log tail: {:#}", e);
                return 0;
            }
        };

        for event in &events {
            info!(
                kind = event.kind(),
                player = event.player_name().unwrap_or("unknown"),
                "Player event"
            );
            deliver_async(
                Arc::clone(sink),
                render::player_event(event),
                self.config.delivery_timeout,
            );
        }

        events.len()
    }

    pub fn extractor(&self) -> &LogEventExtractor {
        &self.extractor
    }

    /// Watch the log file until the watcher stops sending events
    pub async fn run(mut self, sink: Arc<dyn EventSink>) -> Result<()> {
        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(16);

        // Changes arriving while a trigger is still queued are coalesced into it
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.try_send(res);
        };

        let mut watcher = PollWatcher::new(
            handler,
            notify::Config::default().with_poll_interval(self.config.poll_interval),
        )
        .context("Failed to create log file watcher")?;

        if !self.config.log_file.exists() {
            warn!(
                log_file = %self.config.log_file.display(),
                "Log file does not exist yet, waiting for it"
            );
        }

        let file_name = self
            .config
            .log_file
            .file_name()
            .with_context(|| format!("Not a file path: {}", self.config.log_file.display()))?
            .to_os_string();
        let dir = watch_dir(&self.config.log_file);

        // The directory must exist, the file inside it may appear later
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        info!(
            log_file = %self.config.log_file.display(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            tail_lines = self.config.tail_lines,
            "Log watcher started"
        );

        while let Some(res) = rx.recv().await {
            match res {
                Ok(event) if is_change(&event.kind) && touches(&event, &file_name) => {
                    self.handle_change(&sink);
                }
                Ok(_) => {}
                Err(e) => warn!("Log watch error: {}", e),
            }
        }

        info!("Log watcher stopped");
        Ok(())
    }
}

fn is_change(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any)
}

fn touches(event: &Event, file_name: &std::ffi::OsStr) -> bool {
    event.paths.iter().any(|p| p.file_name() == Some(file_name))
}

/// Directory holding the log file, the working directory for a bare name
fn watch_dir(log_file: &Path) -> &Path {
    match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::testing::RecordingSink;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn watcher_for(file: &NamedTempFile, skip_overlap: bool) -> LogWatcher {
        LogWatcher::new(LogWatcherConfig {
            log_file: file.path().to_path_buf(),
            skip_overlap,
            ..Default::default()
        })
        .unwrap()
    }

    fn append(file: &mut NamedTempFile, lines: &[&str]) {
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
    }

    #[test]
    fn test_poll_once_extracts_events() {
        let mut file = NamedTempFile::new().unwrap();
        append(
            &mut file,
            &[
                "02/15/2023 18:42:10: Got handshake from client 77",
                "02/15/2023 18:42:30: Got character ZDOID from Bob : -4512:1",
            ],
        );

        let mut watcher = watcher_for(&file, true);
        let events = watcher.poll_once().unwrap();
        assert_eq!(events, vec![PlayerEvent::PlayerConnected { name: "Bob".to_string() }]);
    }

    #[test]
    fn test_disconnect_window_not_replayed() {
        let mut file = NamedTempFile::new().unwrap();
        append(
            &mut file,
            &[
                "02/15/2023 18:42:10: Got handshake from client 77",
                "02/15/2023 18:42:30: Got character ZDOID from Bob : -4512:1",
                "02/15/2023 18:55:00: Closing socket 77",
            ],
        );

        let mut watcher = watcher_for(&file, true);
        assert_eq!(watcher.poll_once().unwrap().len(), 2);

        append(&mut file, &["02/15/2023 18:55:01: Some unrelated line"]);
        assert!(watcher.poll_once().unwrap().is_empty());
        assert!(watcher.extractor().sessions().is_empty());
    }

    #[test]
    fn test_only_tail_window_is_considered() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &["02/15/2023 18:00:00: Got character ZDOID from Old : 0:0"]);
        append(&mut file, &["noise"; 5]);

        let mut watcher = watcher_for(&file, false);
        assert!(watcher.poll_once().unwrap().is_empty());
    }

    #[test]
    fn test_death_not_repeated_without_overlap_skipping() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &["02/15/2023 18:50:00: Got character ZDOID from Erik : 0:0"]);

        let mut watcher = watcher_for(&file, false);
        assert_eq!(watcher.poll_once().unwrap().len(), 1);
        append(&mut file, &["noise"]);
        assert!(watcher.poll_once().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handle_change_delivers_events() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, &["02/15/2023 18:50:00: Got character ZDOID from Erik : 0:0"]);

        let recording = Arc::new(RecordingSink::default());
        let sink: Arc<dyn EventSink> = recording.clone();
        let mut watcher = watcher_for(&file, true);
        assert_eq!(watcher.handle_change(&sink), 1);

        let delivered = recording.wait_for(1).await;
        assert_eq!(delivered[0].title, "Erik just died! 💀");
    }

    #[tokio::test]
    async fn test_read_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = LogWatcher::new(LogWatcherConfig {
            log_file: dir.path().join("missing.log"),
            ..Default::default()
        })
        .unwrap();

        let sink: Arc<dyn EventSink> = Arc::new(RecordingSink::default());
        assert_eq!(watcher.handle_change(&sink), 0);
    }

    #[test]
    fn test_completed_partial_line_not_replayed() {
        let mut file = NamedTempFile::new().unwrap();
        append(
            &mut file,
            &[
                "02/15/2023 18:42:10: Got handshake from client 77",
                "02/15/2023 18:42:30: Got character ZDOID from Bob : -4512:1",
                "02/15/2023 18:55:00: Closing socket 77",
                "02/15/2023 18:55:01: Some unrelated line",
            ],
        );
        write!(file, "02/15/2023 18:55:02: Still being wri").unwrap();
        file.flush().unwrap();

        let mut watcher = watcher_for(&file, true);
        assert_eq!(watcher.poll_once().unwrap().len(), 2);

        append(&mut file, &["tten"]);
        assert!(watcher.poll_once().unwrap().is_empty());
    }

    fn run_config(log_file: PathBuf) -> LogWatcherConfig {
        LogWatcherConfig {
            log_file,
            poll_interval: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn append_to(path: &Path, lines: &[&str]) {
        let mut file = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    #[tokio::test]
    async fn test_run_announces_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("valheim.log");
        std::fs::write(&log_file, "02/15/2023 18:00:00: Game server connected\n").unwrap();

        let recording = Arc::new(RecordingSink::default());
        let sink: Arc<dyn EventSink> = recording.clone();
        let watcher = LogWatcher::new(run_config(log_file.clone())).unwrap();

        let writer = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            append_to(
                &log_file,
                &[
                    "02/15/2023 18:42:10: Got handshake from client 77",
                    "02/15/2023 18:42:30: Got character ZDOID from Bob : -4512:1",
                ],
            );
            recording.wait_for(1).await
        };

        tokio::select! {
            res = watcher.run(sink) => panic!("watcher stopped early: {:?}", res),
            delivered = writer => {
                assert_eq!(delivered.len(), 1);
                assert!(delivered[0].title.contains("Bob"));
            }
        }
    }

    #[tokio::test]
    async fn test_run_picks_up_file_created_later() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("valheim.log");

        let recording = Arc::new(RecordingSink::default());
        let sink: Arc<dyn EventSink> = recording.clone();
        let watcher = LogWatcher::new(run_config(log_file.clone())).unwrap();

        let writer = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::fs::write(
                &log_file,
                "02/15/2023 18:50:00: Got character ZDOID from Erik : 0:0\n",
            )
            .unwrap();
            recording.wait_for(1).await
        };

        tokio::select! {
            res = watcher.run(sink) => panic!("watcher stopped early: {:?}", res),
            delivered = writer => assert_eq!(delivered[0].title, "Erik just died! 💀"),
        }
    }

    #[test]
    fn test_watch_dir() {
        assert_eq!(watch_dir(Path::new("valheim.log")), Path::new("."));
        assert_eq!(watch_dir(Path::new("/srv/valheim/log.txt")), Path::new("/srv/valheim"));
    }

    #[test]
    fn test_is_change() {
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(!is_change(&EventKind::Remove(RemoveKind::File)));
    }
}
