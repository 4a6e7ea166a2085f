//! Activity log
//!
//! Timestamped, user-facing record of what the sensor session did: status
//! messages, raw inbound lines, commands sent. Kept in a bounded in-memory
//! buffer and optionally mirrored to a file.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default buffer capacity
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Kind of log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Status message
    Info,
    /// Something was refused or failed
    Warn,
    /// Raw line received from the device
    Data,
    /// Command sent to the device
    Command,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was recorded
    pub timestamp: DateTime<Local>,
    /// Severity
    pub level: LogLevel,
    /// Text without timestamp
    pub message: String,
}

impl LogEntry {
    /// Create new entry stamped now
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// `dd.mm.yy  HH:MM:SS<TAB>message`
    pub fn to_text(&self, show_timestamp: bool) -> String {
        if show_timestamp {
            format!("{}\t{}", self.timestamp.format("%d.%m.%y  %H:%M:%S"), self.message)
        } else {
            self.message.clone()
        }
    }

    /// Format as JSON line
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Bounded activity log
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    timestamps: bool,
    file: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ActivityLog {
    /// Create an empty log holding at most `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            timestamps: true,
            file: None,
            path: None,
        }
    }

    /// Mirror every new entry to `path` (appending)
    pub fn start_file(&mut self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(BufWriter::new(file));
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Stop mirroring to file
    pub fn stop_file(&mut self) {
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
        self.file = None;
    }

    /// Mirror file path
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a message and return the stored entry
    pub fn record(&mut self, level: LogLevel, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry::new(level, message);

        if let Some(ref mut file) = self.file {
            let _ = writeln!(file, "{}", entry.to_text(self.timestamps));
            let _ = file.flush();
        }

        self.entries.push_back(entry.clone());
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
        entry
    }

    /// Entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the buffer (the file mirror is untouched)
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Set timestamp display
    pub fn set_timestamps(&mut self, show: bool) {
        self.timestamps = show;
    }

    /// Whole buffer as text, one entry per line
    pub fn export_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.to_text(self.timestamps) + "\n")
            .collect()
    }
}

impl Drop for ActivityLog {
    fn drop(&mut self) {
        self.stop_file();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_text() {
        let entry = LogEntry::new(LogLevel::Info, "Connected");
        assert_eq!(entry.to_text(false), "Connected");

        let text = entry.to_text(true);
        let (stamp, message) = text.split_once('\t').unwrap();
        assert_eq!(message, "Connected");
        // dd.mm.yy  HH:MM:SS
        assert_eq!(stamp.len(), 18);
        assert_eq!(&stamp[8..10], "  ");
    }

    #[test]
    fn test_entry_json() {
        let entry = LogEntry::new(LogLevel::Data, "R 1 G 2 B 3");
        let json = entry.to_json();
        assert!(json.contains("\"level\":\"data\""));
        assert!(json.contains("R 1 G 2 B 3"));
    }

    #[test]
    fn test_buffer_limit() {
        let mut log = ActivityLog::new(5);
        for i in 0..10 {
            log.record(LogLevel::Info, format!("entry {i}"));
        }
        assert_eq!(log.len(), 5);
        assert_eq!(log.entries().next().unwrap().message, "entry 5");
    }

    #[test]
    fn test_clear() {
        let mut log = ActivityLog::default();
        log.record(LogLevel::Info, "one");
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_file_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");

        let mut log = ActivityLog::default();
        log.set_timestamps(false);
        log.start_file(&path).unwrap();
        log.record(LogLevel::Info, "started");
        log.record(LogLevel::Data, "R 1 G 2 B 3");
        log.stop_file();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "started\nR 1 G 2 B 3\n");
        assert_eq!(log.export_text(), content);
    }
}
