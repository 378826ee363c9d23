//! Player event extraction from appended log lines

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use super::dedup::{RecentSet, DEFAULT_CAPACITY};
use super::patterns::LinePatterns;
use super::session::{PendingIdentities, SessionTable, DEFAULT_PENDING_CAPACITY};

/// Domain events announced to the chat channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A handshake was paired with a character name
    PlayerConnected { name: String },
    /// A tracked session closed its socket; the name is unset if it never resolved
    PlayerDisconnected { name: Option<String> },
    /// A character died
    PlayerDied { name: String },
}

impl PlayerEvent {
    pub fn player_name(&self) -> Option<&str> {
        match self {
            PlayerEvent::PlayerConnected { name } | PlayerEvent::PlayerDied { name } => Some(name),
            PlayerEvent::PlayerDisconnected { name } => name.as_deref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PlayerEvent::PlayerConnected { .. } => "connected",
            PlayerEvent::PlayerDisconnected { .. } => "disconnected",
            PlayerEvent::PlayerDied { .. } => "died",
        }
    }
}

/// Extractor tuning
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Handshakes that may wait for an identity line at once
    pub pending_capacity: usize,
    /// Death lines remembered for de-duplication
    pub death_memory: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            pending_capacity: DEFAULT_PENDING_CAPACITY,
            death_memory: DEFAULT_CAPACITY,
        }
    }
}

/// Turns log lines into [`PlayerEvent`]s.
///
/// Owns the session table, the pending handshake queue and the seen-death
/// set; all of them change only inside [`process_line`](Self::process_line).
#[derive(Debug)]
pub struct LogEventExtractor {
    patterns: LinePatterns,
    sessions: SessionTable,
    pending: PendingIdentities,
    seen_deaths: RecentSet,
}

impl LogEventExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        Ok(Self {
            patterns: LinePatterns::new()?,
            sessions: SessionTable::new(),
            pending: PendingIdentities::new(config.pending_capacity),
            seen_deaths: RecentSet::new(config.death_memory),
        })
    }

    /// Process a batch of lines in order
    pub fn process_lines<I, S>(&mut self, lines: I) -> Vec<PlayerEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut events = Vec::new();
        for line in lines {
            self.process_line(line.as_ref(), &mut events);
        }
        events
    }

    /// Match one line against every pattern, running all matching branches
    pub fn process_line(&mut self, line: &str, events: &mut Vec<PlayerEvent>) {
        if let Some(id) = self.patterns.handshake(line) {
            self.on_handshake(id, line);
        }

        if let Some(name) = self.patterns.identity(line) {
            if let Some(event) = self.on_identity(name) {
                events.push(event);
            }
        }

        if let Some(id) = self.patterns.disconnect(line) {
            if let Some(event) = self.on_disconnect(id, line) {
                events.push(event);
            }
        }

        if let Some(death) = self.patterns.death(line) {
            if self.seen_deaths.insert(death.raw) {
                events.push(PlayerEvent::PlayerDied {
                    name: death.player_name.to_string(),
                });
            } else {
                debug!(player = death.player_name, "Skipping already reported death");
            }
        }
    }

    fn on_handshake(&mut self, id: &str, line: &str) {
        let connected_at = self.line_time(line);
        if !self.sessions.open(id, connected_at) {
            return;
        }
        debug!(session_id = id, "Session opened");
        if let Some(dropped) = self.pending.push(id) {
            debug!(
                session_id = %dropped,
                "Handshake replaced before identity resolved, session stays unnamed"
            );
        }
    }

    fn on_identity(&mut self, name: &str) -> Option<PlayerEvent> {
        let id = self.pending.take(&self.sessions)?;
        for stale in self.sessions.resolve(&id, name) {
            debug!(
                session_id = %stale.session_id,
                player = name,
                "Evicted stale session holding the same player"
            );
        }
        Some(PlayerEvent::PlayerConnected {
            name: name.to_string(),
        })
    }

    fn on_disconnect(&mut self, id: &str, line: &str) -> Option<PlayerEvent> {
        let disconnected_at = self.line_time(line);
        let session = self.sessions.close(id, disconnected_at)?;
        self.pending.forget(id);
        debug!(session_id = id, player = ?session.player_name, "Session closed");
        Some(PlayerEvent::PlayerDisconnected {
            name: session.player_name,
        })
    }

    fn line_time(&self, line: &str) -> NaiveDateTime {
        self.patterns
            .timestamp(line)
            .unwrap_or_else(|| Local::now().naive_local())
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Oldest handshake still waiting for its identity line
    pub fn pending_session_id(&self) -> Option<&str> {
        self.pending.peek()
    }
}
