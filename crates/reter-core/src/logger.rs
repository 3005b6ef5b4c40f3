//! Task logging capability
//!
//! The scheduler reports task lifecycle events (start, stop, lock traffic,
//! skips, errors) through a [`TaskLogger`] passed in at construction.
//! [`TracingLogger`] forwards them to `tracing`.

use std::error::Error as StdError;
use std::fmt;

use tracing::Level;

/// Severity of a task log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Failures
    Error,
    /// Degraded but continuing
    Warn,
    /// Lifecycle milestones
    Info,
    /// Normal control flow (skips, lock traffic)
    Debug,
    /// Very verbose
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// One structured log record about a task
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    /// Task name
    pub task: &'a str,
    /// Human-readable message
    pub message: &'a str,
    /// Error being reported, if any
    pub error: Option<&'a (dyn StdError + 'static)>,
}

impl<'a> LogRecord<'a> {
    /// Record without an attached error
    pub fn new(task: &'a str, message: &'a str) -> Self {
        Self {
            task,
            message,
            error: None,
        }
    }

    /// Attach an error
    pub fn with_error(mut self, error: &'a (dyn StdError + 'static)) -> Self {
        self.error = Some(error);
        self
    }
}

/// Sink for task log records
pub trait TaskLogger: Send + Sync {
    /// Emit one record
    fn log(&self, level: LogLevel, record: &LogRecord<'_>);

    /// Emit a debug record
    fn debug(&self, task: &str, message: &str) {
        self.log(LogLevel::Debug, &LogRecord::new(task, message));
    }

    /// Emit an info record
    fn info(&self, task: &str, message: &str) {
        self.log(LogLevel::Info, &LogRecord::new(task, message));
    }

    /// Emit an error record
    fn error(&self, task: &str, error: &(dyn StdError + 'static), message: &str) {
        self.log(
            LogLevel::Error,
            &LogRecord::new(task, message).with_error(error),
        );
    }
}

/// Forwards task records to `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

macro_rules! emit {
    ($level:expr, $record:expr) => {
        tracing::event!(
            $level,
            task = $record.task,
            error = $record.error.map(tracing::field::display),
            "{}",
            $record.message
        )
    };
}

impl TaskLogger for TracingLogger {
    fn log(&self, level: LogLevel, record: &LogRecord<'_>) {
        match level {
            LogLevel::Error => emit!(Level::ERROR, record),
            LogLevel::Warn => emit!(Level::WARN, record),
            LogLevel::Info => emit!(Level::INFO, record),
            LogLevel::Debug => emit!(Level::DEBUG, record),
            LogLevel::Trace => emit!(Level::TRACE, record),
        }
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl TaskLogger for NoopLogger {
    fn log(&self, _level: LogLevel, _record: &LogRecord<'_>) {}
}


#[cfg(test)]
mod tests {
    use super::testing::CapturingLogger;
    use super::*;

    #[test]
    fn test_level_display() {
        assert_eq!(LogLevel::Error.to_string(), "error");
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert!(LogLevel::Error < LogLevel::Debug);
    }

    #[test]
    fn test_default_helpers_route_through_log() {
        let logger = CapturingLogger::default();
        let err = std::io::Error::other("boom");

        logger.info("t1", "task started");
        logger.debug("t1", "too early");
        logger.error("t1", &err, "reading last run");

        let records = logger.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[2].error.as_deref(), Some("boom"));
        assert_eq!(records[2].task, "t1");
    }

    #[test]
    fn test_tracing_logger_accepts_all_levels() {
        let err = std::io::Error::other("boom");
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            TracingLogger.log(level, &LogRecord::new("t1", "message").with_error(&err));
        }
        NoopLogger.info("t1", "ignored");
    }
}
