//! Firmdesk logging
//!
//! Structured logging via `tracing`. The server logs to stdout or to a daily
//! rolling file; the CLI logs to stderr so command output on stdout stays
//! machine-readable.

use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Logging configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to output
    pub level: Level,
    /// Enable colored output
    pub color: bool,
    /// Show timestamps
    pub show_timestamps: bool,
    /// Show target/module name
    pub show_target: bool,
    /// Enable JSON format for machine parsing
    pub json_format: bool,
    /// Emit span close events
    pub enable_spans: bool,
    /// Write to a daily rolling file in this directory instead of a stream
    pub log_dir: Option<PathBuf>,
    pub mode: ApplicationMode,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::for_mode(ApplicationMode::Cli)
    }
}

impl LoggingConfig {
    /// Create config for different application modes
    pub fn for_mode(mode: ApplicationMode) -> Self {
        match mode {
            ApplicationMode::Server => Self {
                level: Level::INFO,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: false,
                log_dir: None,
                mode,
            },
            ApplicationMode::Cli => Self {
                level: Level::WARN,
                color: io::stderr().is_terminal(),
                show_timestamps: false,
                show_target: false,
                json_format: false,
                enable_spans: false,
                log_dir: None,
                mode,
            },
            ApplicationMode::Test => Self {
                level: Level::DEBUG,
                color: false,
                show_timestamps: true,
                show_target: true,
                json_format: false,
                enable_spans: true,
                log_dir: None,
                mode,
            },
        }
    }

    /// Apply `-q`, `-v`/`-vv` and `--json` on top of a mode's defaults
    pub fn from_args(mode: ApplicationMode, quiet: bool, verbosity: u8, json: bool) -> Self {
        let mut config = Self::for_mode(mode);
        if quiet {
            config.level = Level::ERROR;
        } else if verbosity >= 2 {
            config.level = Level::TRACE;
        } else if verbosity == 1 {
            config.level = Level::DEBUG;
        }
        if verbosity > 0 {
            config.show_target = true;
            config.enable_spans = true;
        }
        if json {
            config.json_format = true;
            config.color = false;
            config.show_timestamps = true;
        }
        config
    }

    /// Override from `FIRMDESK_LOG_LEVEL`, `FIRMDESK_LOG_JSON` and `FIRMDESK_LOG_DIR`
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = std::env::var("FIRMDESK_LOG_LEVEL")
            .ok()
            .as_deref()
            .and_then(parse_level)
        {
            self.level = level;
        }
        if std::env::var("FIRMDESK_LOG_JSON").as_deref() == Ok("true") {
            self.json_format = true;
            self.color = false;
        }
        if let Ok(dir) = std::env::var("FIRMDESK_LOG_DIR") {
            if !dir.trim().is_empty() {
                self.log_dir = Some(PathBuf::from(dir));
            }
        }
        self
    }
}

/// Application modes with different logging requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationMode {
    /// HTTP service: timestamps and targets, long-running
    Server,
    /// Operator commands: quiet, human-friendly, on stderr
    Cli,
    /// Test mode - maximum detail for testing
    Test,
}

impl ApplicationMode {
    fn file_prefix(&self) -> &'static str {
        match self {
            ApplicationMode::Server => "server.log",
            ApplicationMode::Cli => "cli.log",
            ApplicationMode::Test => "test.log",
        }
    }
}

pub fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Default directory for log files: the platform's local data dir
pub fn default_log_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("firmdesk").join("logs"))
}

/// Initialize the logging system. Fails if a global subscriber is already set.
pub fn init_logging(config: LoggingConfig) -> io::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "firmdesk={level},tower_http={level}",
            level = config.level
        ))
    });

    let registry = Registry::default().with(env_filter);

    let to_file = config.log_dir.is_some();
    let writer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            BoxMakeWriter::new(tracing_appender::rolling::daily(
                dir,
                config.mode.file_prefix(),
            ))
        },
        None if config.mode == ApplicationMode::Server => BoxMakeWriter::new(io::stdout),
        None => BoxMakeWriter::new(io::stderr),
    };

    let result = if config.json_format {
        let span_events = if config.enable_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        fmt::layer()
            .json()
            .with_current_span(config.enable_spans)
            .with_span_events(span_events)
            .with_timer(fmt::time::ChronoUtc::rfc_3339())
            .with_writer(writer)
            .with_subscriber(registry)
            .try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_level(true)
            .with_ansi(config.color && !to_file)
            .with_writer(writer);

        if config.show_timestamps {
            fmt_layer
                .with_timer(fmt::time::ChronoUtc::rfc_3339())
                .with_subscriber(registry)
                .try_init()
        } else {
            fmt_layer.without_time().with_subscriber(registry).try_init()
        }
    };

    result.map_err(io::Error::other)
}

/// Remove rotated log files older than `retention_days`.
///
/// Only files named like `server.log.YYYY-MM-DD` are considered.
pub fn cleanup_old_logs(log_dir: &Path, retention_days: u32) -> io::Result<usize> {
    use std::fs;
    use std::time::SystemTime;

    if !log_dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_rotated = path
            .file_name()
            .map(|n| n.to_string_lossy().contains(".log."))
            .unwrap_or(false);
        if !is_rotated || !path.is_file() {
            continue;
        }

        let modified = entry.metadata()?.modified()?;
        if let Ok(age) = now.duration_since(modified) {
            if age > retention {
                match fs::remove_file(&path) {
                    Ok(_) => {
                        removed += 1;
                        tracing::info!(path = %path.display(), "Removed old log file");
                    },
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to remove old log file");
                    },
                }
            }
        }
    }

    Ok(removed)
}

/// Log a task mutation
#[macro_export]
macro_rules! log_task_operation {
    ($operation:expr, $task_id:expr) => {
        tracing::info!(operation = $operation, task_id = $task_id, "Task operation");
    };
    ($operation:expr, $task_id:expr, $details:expr) => {
        tracing::info!(
            operation = $operation,
            task_id = $task_id,
            details = $details,
            "Task operation"
        );
    };
}

#[macro_export]
macro_rules! log_error {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Operation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("INFO"), Some(Level::INFO));
        assert_eq!(parse_level(" warning "), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_mode_defaults() {
        let server = LoggingConfig::for_mode(ApplicationMode::Server);
        assert_eq!(server.level, Level::INFO);
        assert!(server.show_timestamps);

        let cli = LoggingConfig::for_mode(ApplicationMode::Cli);
        assert_eq!(cli.level, Level::WARN);
        assert!(!cli.json_format);
    }

    #[test]
    fn test_args_override_mode() {
        let quiet = LoggingConfig::from_args(ApplicationMode::Server, true, 2, false);
        assert_eq!(quiet.level, Level::ERROR);

        let verbose = LoggingConfig::from_args(ApplicationMode::Cli, false, 1, false);
        assert_eq!(verbose.level, Level::DEBUG);
        assert!(verbose.show_target);

        let json = LoggingConfig::from_args(ApplicationMode::Cli, false, 0, true);
        assert!(json.json_format);
        assert!(!json.color);
    }

    #[test]
    fn test_cleanup_ignores_live_files_and_missing_dirs() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("server.log");
        let unrelated = temp.path().join("notes.txt");
        std::fs::write(&live, "live").unwrap();
        std::fs::write(&unrelated, "keep").unwrap();

        assert_eq!(cleanup_old_logs(temp.path(), 0).unwrap(), 0);
        assert!(live.exists());
        assert!(unrelated.exists());

        assert_eq!(cleanup_old_logs(&temp.path().join("missing"), 7).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_keeps_recent_rotated_files() {
        let temp = TempDir::new().unwrap();
        let rotated = temp.path().join("server.log.2026-10-18");
        std::fs::write(&rotated, "yesterday").unwrap();

        assert_eq!(cleanup_old_logs(temp.path(), 7).unwrap(), 0);
        assert!(rotated.exists());
    }
}
