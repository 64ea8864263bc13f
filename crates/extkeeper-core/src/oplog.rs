//! Per-operation log lines
//!
//! Engine operations never touch a UI. They append human-readable lines to an
//! [`OpLog`] the caller owns, and each line is mirrored to `tracing` under
//! the [`OPLOG_TARGET`] target.

use std::fmt;

/// `tracing` target of mirrored lines, so a subscriber can filter them out
/// when the caller already prints the log itself
pub const OPLOG_TARGET: &str = "oplog";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Default)]
pub struct OpLog {
    lines: Vec<LogLine>,
}

impl OpLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: OPLOG_TARGET, "{}", message);
        self.push(LogLevel::Info, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: OPLOG_TARGET, "{}", message);
        self.push(LogLevel::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: OPLOG_TARGET, "{}", message);
        self.push(LogLevel::Error, message);
    }

    fn push(&mut self, level: LogLevel, message: String) {
        self.lines.push(LogLine { level, message });
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Take all collected lines, leaving the log empty
    pub fn drain(&mut self) -> Vec<LogLine> {
        std::mem::take(&mut self.lines)
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|l| l.message.contains(needle))
    }

    pub fn has_errors(&self) -> bool {
        self.lines.iter().any(|l| l.level == LogLevel::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order_with_levels() {
        let mut log = OpLog::new();
        log.info("scanning");
        log.warn("fallback");
        log.error("broken");

        let levels: Vec<_> = log.lines().iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);
        assert!(log.contains("fallback"));
        assert!(log.has_errors());
    }

    #[test]
    fn drain_empties_log() {
        let mut log = OpLog::new();
        log.info("one");
        let lines = log.drain();
        assert_eq!(lines.len(), 1);
        assert!(log.lines().is_empty());
    }
}
