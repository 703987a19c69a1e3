use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format::FmtSpan, MakeWriter},
    EnvFilter,
};

use crate::error::{ChatError, Result};

static INIT: Once = Once::new();

/// Diagnostic logging options. Unrelated to the event log, which is always
/// written regardless of these settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level, overridden by `RUST_LOG` when set
    pub level: Level,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include source code locations
    pub source_location: bool,
    /// Whether to log span open/close
    pub log_spans: bool,
    /// Output file path (None for stderr)
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            timestamps: true,
            source_location: false,
            log_spans: false,
            file_path: None,
        }
    }
}

impl LogConfig {
    /// Default options at the given level
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }
}

/// Install the global tracing subscriber.
///
/// Only the first call installs anything; later calls are no-ops that still
/// report an unopenable log file.
pub fn setup_logging(config: LogConfig) -> Result<()> {
    let file = match &config.file_path {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    ChatError::config("log_file", format!("Failed to open {}: {}", path.display(), e))
                })?,
        ),
        None => None,
    };

    let mut result = Ok(());
    INIT.call_once(|| {
        result = match file {
            Some(file) => install(&config, Mutex::new(file), false),
            None => install(&config, std::io::stderr, true),
        };
    });
    result
}

fn install<W>(config: &LogConfig, writer: W, ansi: bool) -> Result<()>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_span_events(if config.log_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_ansi(ansi)
        .with_writer(writer);

    let installed = if config.timestamps {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };

    installed.map_err(|e| ChatError::config("log_level", format!("Failed to set global subscriber: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_log_initialization_is_idempotent() {
        assert!(setup_logging(LogConfig::with_level(Level::DEBUG)).is_ok());
        assert!(setup_logging(LogConfig::default()).is_ok());
        tracing::info!(device = "cpu", "Logging ready");
    }

    #[test]
    fn test_unopenable_file_is_reported() {
        let dir = tempdir().unwrap();
        let config = LogConfig {
            file_path: Some(dir.path().join("missing").join("chat.log")),
            ..Default::default()
        };

        assert!(matches!(
            setup_logging(config),
            Err(ChatError::Config { ref parameter, .. }) if parameter == "log_file"
        ));
    }
}
