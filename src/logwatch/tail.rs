//! Tail window reads of a growing log file

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Default number of lines read per trigger
pub const DEFAULT_TAIL_LINES: usize = 5;

const CHUNK_SIZE: u64 = 4096;

/// Read the last `n` lines of a file, oldest first.
///
/// Reads backwards in fixed chunks so only the end of the file is touched.
/// A trailing newline does not count as an empty last line. An unterminated
/// last line is still being written and is left for the next read.
pub fn read_last_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;
    let file_size = file
        .metadata()
        .context("Failed to read log file metadata")?
        .len();

    let mut buf: Vec<u8> = Vec::new();
    let mut position = file_size;

    // One extra newline is needed to know the first kept line is complete
    while position > 0 && count_newlines(&buf, file_size) <= n {
        let read_size = CHUNK_SIZE.min(position);
        position -= read_size;
        file.seek(SeekFrom::Start(position))
            .context("Failed to seek log file")?;

        let mut chunk = vec![0u8; read_size as usize];
        file.read_exact(&mut chunk)
            .context("Failed to read log file")?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    if buf.last().is_some_and(|&b| b != b'\n') {
        let complete = buf.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
        buf.truncate(complete);
    }

    let mut lines = decode_lines(&buf);
    if lines.len() > n {
        lines = lines.split_off(lines.len() - n);
    }

    Ok(lines)
}

/// Split raw log bytes into lines. Invalid UTF-8 is replaced, not rejected.
pub fn decode_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(|l| l.trim_end_matches('\r').to_string())
        .collect()
}

/// Newlines in `buf`, ignoring the one terminating the file
fn count_newlines(buf: &[u8], file_size: u64) -> usize {
    let count = buf.iter().filter(|&&b| b == b'\n').count();
    if file_size > 0 && buf.last() == Some(&b'\n') {
        count.saturating_sub(1)
    } else {
        count
    }
}

/// Remembers the previous tail window so re-read lines can be skipped
#[derive(Debug, Default)]
pub struct TailWindow {
    previous: Vec<String>,
}

impl TailWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `current` as the latest window and return the lines that were
    /// not part of the previous one.
    ///
    /// The overlap is the longest suffix of the previous window equal to a
    /// prefix of the current one.
    pub fn advance(&mut self, current: Vec<String>) -> Vec<String> {
        let overlap = overlap_len(&self.previous, &current);
        let fresh = current[overlap..].to_vec();
        self.previous = current;
        fresh
    }
}

fn overlap_len(previous: &[String], current: &[String]) -> usize {
    let max = previous.len().min(current.len());
    (1..=max)
        .rev()
        .find(|&k| previous[previous.len() - k..] == current[..k])
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn write_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_read_last_lines() {
        let file = write_file("1\n2\n3\n4\n5\n6\n7\n");
        assert_eq!(
            read_last_lines(file.path(), 5).unwrap(),
            lines(&["3", "4", "5", "6", "7"])
        );
    }

    #[test]
    fn test_read_last_lines_skips_unterminated_line() {
        let file = write_file("1\n2\n3\n4");
        assert_eq!(read_last_lines(file.path(), 2).unwrap(), lines(&["2", "3"]));

        let partial = write_file("no newline yet");
        assert!(read_last_lines(partial.path(), 5).unwrap().is_empty());
    }

    #[test]
    fn test_completed_line_does_not_replay_window() {
        let mut file = write_file("a\nb\nc\nd\npart");
        let mut window = TailWindow::new();
        let first = window.advance(read_last_lines(file.path(), 5).unwrap());
        assert_eq!(first, lines(&["a", "b", "c", "d"]));

        file.write_all(b"ial\n").unwrap();
        file.flush().unwrap();
        let second = window.advance(read_last_lines(file.path(), 5).unwrap());
        assert_eq!(second, lines(&["partial"]));
    }

    #[test]
    fn test_read_last_lines_short_file() {
        let file = write_file("only\r\n");
        assert_eq!(read_last_lines(file.path(), 5).unwrap(), lines(&["only"]));

        let empty = write_file("");
        assert!(read_last_lines(empty.path(), 5).unwrap().is_empty());
    }

    #[test]
    fn test_read_last_lines_across_chunks() {
        let long = "x".repeat(3000);
        let content: String = (0..10).map(|i| format!("{}{}\n", i, long)).collect();
        let file = write_file(&content);
        let tail = read_last_lines(file.path(), 3).unwrap();
        assert_eq!(tail.len(), 3);
        assert!(tail[0].starts_with('7'));
        assert_eq!(tail[0].len(), 3001);
        assert!(tail[2].starts_with('9'));
    }

    #[test]
    fn test_decode_lines_tolerates_invalid_utf8() {
        let decoded = decode_lines(b"ok\r\nbad \xff byte\nlast\n");
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], "ok");
        assert!(decoded[1].starts_with("bad "));
        assert_eq!(decoded[2], "last");
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_last_lines(&dir.path().join("missing.log"), 5).is_err());
    }

    #[test]
    fn test_window_returns_only_new_lines() {
        let mut window = TailWindow::new();
        assert_eq!(window.advance(lines(&["a", "b", "c"])), lines(&["a", "b", "c"]));
        assert_eq!(window.advance(lines(&["b", "c", "d"])), lines(&["d"]));
        assert!(window.advance(lines(&["b", "c", "d"])).is_empty());
        assert_eq!(window.advance(lines(&["x", "y", "z"])), lines(&["x", "y", "z"]));
    }

    #[test]
    fn test_window_repeated_line_appended() {
        let mut window = TailWindow::new();
        window.advance(lines(&["a", "b", "c", "d", "e"]));
        assert_eq!(window.advance(lines(&["b", "c", "d", "e", "e"])), lines(&["e"]));
    }
}
