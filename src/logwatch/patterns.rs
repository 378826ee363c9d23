//! Line patterns for the Valheim dedicated server log
//!
//! Each pattern is tried independently against every line; a single line may
//! match more than one of them.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use regex::Regex;

/// New client socket: `Got handshake from client 76561198000000000`
const HANDSHAKE_PATTERN: &str = r"handshake from client (\d+)";
/// Character resolved for a connecting client: `Got character ZDOID from Erik : -1234:1`
const IDENTITY_PATTERN: &str = r"Got character ZDOID from ([\w ]+)\s:";
/// Client socket closed: `Closing socket 76561198000000000`
const DISCONNECT_PATTERN: &str = r"Closing socket (\d\d+)";
/// Character ZDOID reset to 0:0, logged when the character dies
const DEATH_PATTERN: &str = r".*?Got character ZDOID from (.*) : 0:0";
/// Leading timestamp: `02/15/2023 18:42:10`
const TIMESTAMP_PATTERN: &str = r"\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}";
const TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// A matched death line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathMatch<'a> {
    /// Raw matched text, used as the de-duplication key
    pub raw: &'a str,
    /// Name of the character that died
    pub player_name: &'a str,
}

/// Compiled regexes for every line kind the extractor cares about
#[derive(Debug, Clone)]
pub struct LinePatterns {
    handshake: Regex,
    identity: Regex,
    disconnect: Regex,
    death: Regex,
    timestamp: Regex,
}

impl LinePatterns {
    /// Compile the built-in Valheim patterns
    pub fn new() -> Result<Self> {
        Ok(Self {
            handshake: compile(HANDSHAKE_PATTERN)?,
            identity: compile(IDENTITY_PATTERN)?,
            disconnect: compile(DISCONNECT_PATTERN)?,
            death: compile(DEATH_PATTERN)?,
            timestamp: compile(TIMESTAMP_PATTERN)?,
        })
    }

    /// Client id of a handshake line
    pub fn handshake<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.handshake
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Player name of a character identity line
    pub fn identity<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.identity
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Client id of a socket closing line
    pub fn disconnect<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.disconnect
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// Death match of a character death line
    pub fn death<'a>(&self, line: &'a str) -> Option<DeathMatch<'a>> {
        let caps = self.death.captures(line)?;
        let raw = caps.get(0)?.as_str();
        let player_name = caps.get(1)?.as_str();
        Some(DeathMatch { raw, player_name })
    }

    /// Timestamp prefix of a line, if present and valid
    pub fn timestamp(&self, line: &str) -> Option<NaiveDateTime> {
        let m = self.timestamp.find(line)?;
        NaiveDateTime::parse_from_str(m.as_str(), TIMESTAMP_FORMAT).ok()
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).with_context(|| format!("Invalid line pattern: {}", pattern))
}
