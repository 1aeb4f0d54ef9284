//! Logging Module
//!
//! Structured logging via the `tracing` crate, plus the per-run text log
//! (`log.txt`) that mirrors every training message with a local timestamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use chrono_tz::Tz;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::utils::error::{LabError, Result};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> std::result::Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Parse an IANA timezone name such as `Asia/Seoul`
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| LabError::Config(format!("Unknown timezone '{}': {}", name, e)))
}

/// Append-only text log for a single run
///
/// Each message is written as `\n[YYYY-mm-dd HH:MM:SS]\tmsg` using the
/// configured timezone and echoed through `tracing`.
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
    timezone: Tz,
}

impl RunLog {
    /// Create a run log writing to `{run_dir}/log.txt`
    pub fn new(run_dir: &Path, timezone: Tz) -> Self {
        Self {
            path: run_dir.join("log.txt"),
            timezone,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message to the log file and emit it at info level
    pub fn log(&self, message: &str) -> Result<()> {
        tracing::info!("{}", message);

        let timestamp = Utc::now()
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        write!(file, "\n[{}]\t{}", timestamp, message)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
    }

    #[test]
    fn test_parse_timezone() {
        assert!(parse_timezone("Asia/Seoul").is_ok());
        assert!(parse_timezone("UTC").is_ok());
        assert!(matches!(parse_timezone("Mars/Olympus"), Err(LabError::Config(_))));
    }

    #[test]
    fn test_run_log_appends_timestamped_lines() {
        let dir = tempdir().unwrap();
        let log = RunLog::new(dir.path(), chrono_tz::Asia::Seoul);

        log.log("first").unwrap();
        log.log("second").unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<&str> = content.split('\n').collect();
        // Leading newline before every entry
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "");
        assert!(lines[1].starts_with('['));
        assert!(lines[1].ends_with("]\tfirst"));
        assert!(lines[2].ends_with("]\tsecond"));
        // "[YYYY-mm-dd HH:MM:SS]" is 21 characters
        assert_eq!(lines[1].find(']'), Some(20));
    }
}
