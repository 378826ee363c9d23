//! Player events from the dedicated server log
//!
//! The watcher re-reads the last few lines of the log file on every change,
//! the extractor matches them against known line patterns and keeps track of
//! the client sessions needed to name connecting and disconnecting players.

pub mod dedup;
pub mod extractor;
pub mod patterns;
pub mod session;
pub mod tail;
pub mod watcher;

pub use dedup::RecentSet;
pub use extractor::{ExtractorConfig, LogEventExtractor, PlayerEvent};
pub use patterns::LinePatterns;
pub use session::{PendingIdentities, Session, SessionTable};
pub use tail::{decode_lines, read_last_lines, TailWindow};
pub use watcher::{LogWatcher, LogWatcherConfig};
