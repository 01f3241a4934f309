//! Run logging.
//!
//! Every pipeline stage reports through a process-wide [`LogSink`].
//! Entries are printed to stderr (stdout is kept for command output) and
//! optionally mirrored as JSON lines to a file.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting depth (per identifier, per artifact)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    fn render(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(self.indent as usize);
        format!("{}{} {}", indent, prefix, self.message)
    }
}

/// Global log sink
pub static LOG_SINK: Lazy<LogSink> = Lazy::new(LogSink::new);

pub struct LogSink {
    quiet: AtomicBool,
    mirror: Mutex<Option<File>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self {
            quiet: AtomicBool::new(false),
            mirror: Mutex::new(None),
        }
    }

    pub fn log(&self, entry: LogEntry) {
        let muted = self.quiet.load(Ordering::Relaxed)
            && matches!(entry.level, LogLevel::Info | LogLevel::Success);
        if !muted {
            eprintln!("{}", entry.render());
        }

        if let Ok(mut guard) = self.mirror.lock() {
            if let Some(file) = guard.as_mut() {
                if let Ok(line) = serde_json::to_string(&entry) {
                    // A failing mirror must not abort the run.
                    let _ = writeln!(file, "{}", line);
                }
            }
        }
    }

    /// Suppress info and success entries on stderr.
    pub fn set_quiet(&self, quiet: bool) {
        self.quiet.store(quiet, Ordering::Relaxed);
    }

    /// Append every subsequent entry to `path` as one JSON object per line.
    pub fn mirror_to(&self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if let Ok(mut guard) = self.mirror.lock() {
            *guard = Some(file);
        }
        Ok(())
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_SINK.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_SINK.log(LogEntry::info(msg).with_indent(indent));
}

pub fn log_success_indent(msg: impl Into<String>, indent: u8) {
    LOG_SINK.log(LogEntry::success(msg).with_indent(indent));
}

pub fn log_warning_indent(msg: impl Into<String>, indent: u8) {
    LOG_SINK.log(LogEntry::warning(msg).with_indent(indent));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serializes_camel_case() {
        let entry = LogEntry::warning("3 rows dropped").with_indent(2);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["message"], "3 rows dropped");
        assert_eq!(json["indent"], 2);
    }

    #[test]
    fn test_render_indents() {
        let line = LogEntry::success("done").with_indent(1).render();
        assert!(line.starts_with("      ✓"));
        assert!(line.ends_with("done"));
    }

    #[test]
    fn test_mirror_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");

        let sink = LogSink::new();
        sink.set_quiet(true);
        sink.mirror_to(&path).unwrap();
        sink.log(LogEntry::info("first"));
        sink.log(LogEntry::error("second"));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: LogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.level, LogLevel::Error);
    }
}
