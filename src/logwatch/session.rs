//! Connection sessions inferred from the server log
//!
//! A session is opened by a handshake line, named by a later character
//! identity line and closed by a socket closing line.

use chrono::NaiveDateTime;
use std::collections::{HashMap, VecDeque};

/// One client connection as seen in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Client id from the handshake line
    pub session_id: String,
    /// When the handshake was logged
    pub connected_at: NaiveDateTime,
    /// When the socket was closed (unset while active)
    pub disconnected_at: Option<NaiveDateTime>,
    /// Character name, unset until an identity line resolves it
    pub player_name: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>, connected_at: NaiveDateTime) -> Self {
        Self {
            session_id: session_id.into(),
            connected_at,
            disconnected_at: None,
            player_name: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.player_name.is_some()
    }
}

/// Active sessions keyed by client id.
///
/// At most one session holds any given player name.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session unless one with this id is already tracked.
    /// Returns `true` if a new session was created.
    pub fn open(&mut self, session_id: &str, connected_at: NaiveDateTime) -> bool {
        if self.sessions.contains_key(session_id) {
            return false;
        }
        self.sessions
            .insert(session_id.to_string(), Session::new(session_id, connected_at));
        true
    }

    /// Assign a player name to a session and evict every other session
    /// holding the same name. Returns the evicted sessions.
    pub fn resolve(&mut self, session_id: &str, player_name: &str) -> Vec<Session> {
        let Some(session) = self.sessions.get_mut(session_id) else {
            return Vec::new();
        };
        session.player_name = Some(player_name.to_string());

        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|(id, s)| id.as_str() != session_id && s.player_name.as_deref() == Some(player_name))
            .map(|(id, _)| id.clone())
            .collect();

        stale
            .into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .collect()
    }

    /// Remove a session, stamping its disconnect time
    pub fn close(&mut self, session_id: &str, disconnected_at: NaiveDateTime) -> Option<Session> {
        let mut session = self.sessions.remove(session_id)?;
        session.disconnected_at = Some(disconnected_at);
        Some(session)
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Session currently holding a player name
    pub fn find_by_player(&self, player_name: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|s| s.player_name.as_deref() == Some(player_name))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Handshakes waiting for their identity line, oldest first.
///
/// Identity lines carry no client id, so they are paired with the oldest
/// pending handshake. When a handshake arrives with the queue full, the
/// oldest pending id is dropped and its session is never named. With the
/// default capacity of one this means an identity line always pairs with the
/// most recent handshake.
#[derive(Debug)]
pub struct PendingIdentities {
    capacity: usize,
    queue: VecDeque<String>,
}

/// Default number of handshakes awaiting identity
pub const DEFAULT_PENDING_CAPACITY: usize = 1;

impl PendingIdentities {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            queue: VecDeque::with_capacity(capacity),
        }
    }

    /// Queue a handshake. Returns the id dropped to make room, if any.
    pub fn push(&mut self, session_id: &str) -> Option<String> {
        self.forget(session_id);
        let dropped = if self.queue.len() == self.capacity {
            self.queue.pop_front()
        } else {
            None
        };
        self.queue.push_back(session_id.to_string());
        dropped
    }

    /// Take the oldest pending id still present in `sessions`.
    /// Ids whose session has already gone are discarded.
    pub fn take(&mut self, sessions: &SessionTable) -> Option<String> {
        while let Some(id) = self.queue.pop_front() {
            if sessions.contains(&id) {
                return Some(id);
            }
        }
        None
    }

    /// Remove an id from the queue (its session was closed)
    pub fn forget(&mut self, session_id: &str) {
        self.queue.retain(|id| id != session_id);
    }

    pub fn peek(&self) -> Option<&str> {
        self.queue.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for PendingIdentities {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_CAPACITY)
    }
}
