//! Host log forwarding
//!
//! Mobile hosts route diagnostics into Logcat or OSLog rather than stdout.
//! The core mirrors every `tracing` event that passes its filter into a
//! [`LoggerSink`] as a [`LogEntry`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One forwarded log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Module path of the emitting code, e.g. `core_auth::client`.
    pub target: String,
    pub message: String,
    /// Event fields, ordered by name.
    pub fields: BTreeMap<String, String>,
    /// Name of the innermost span the event was emitted in.
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Single-line rendering: `<time> <LEVEL> <target>: <message> k=v ...`.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {:>5} {}: {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.level.as_str().to_uppercase(),
            self.target,
            self.message
        );
        for (key, value) in &self.fields {
            line.push_str(&format!(" {}={}", key, value));
        }
        line
    }
}

/// Receives log entries from the core.
///
/// Entries arrive with credentials and e-mail addresses already masked when
/// sink redaction is on; implementations need not scrub them again.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Entries below this level are never sent.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Writes each entry as one line on stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[async_trait::async_trait]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        eprintln!("{}", entry.to_line());
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_order_by_severity() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert_eq!(LogLevel::Warn.to_string(), "warn");
    }

    #[test]
    fn test_line_lists_fields_sorted() {
        let entry = LogEntry::new(LogLevel::Warn, "core_auth::client", "Sign-in refused")
            .with_field("scope", "User.Read")
            .with_field("account_id", "oid-1");

        let line = entry.to_line();
        assert!(line.contains(" WARN core_auth::client: Sign-in refused"));
        assert!(line.ends_with("account_id=oid-1 scope=User.Read"));
        assert_eq!(entry.field("scope"), Some("User.Read"));
        assert_eq!(entry.span, None);
    }

    #[tokio::test]
    async fn test_console_logger_accepts_entries() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Debug,
        };
        assert_eq!(logger.min_level(), LogLevel::Debug);
        logger
            .log(LogEntry::new(LogLevel::Info, "test", "hello"))
            .await
            .unwrap();
    }
}
