use crate::errors::types::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

/// How log lines are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single lines
    #[default]
    Text,
    /// One JSON object per event, for log shippers
    Json,
}

/// Subscriber settings, usually built from the application's config file
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Floor applied when `RUST_LOG` does not say otherwise
    pub level: Level,
    pub format: LogFormat,
    /// Include source file and line in every event
    pub file_info: bool,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            format: LogFormat::Text,
            file_info: false,
            app_name: "rental".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Switch to JSON output when `json` is set
    pub fn with_json(mut self, json: bool) -> Self {
        self.format = if json { LogFormat::Json } else { LogFormat::Text };
        self
    }

    pub fn with_file_info(mut self, file_info: bool) -> Self {
        self.file_info = file_info;
        self
    }
}

/// Install the global `tracing` subscriber.
///
/// Logs go to stderr so that command output on stdout stays clean. Calling
/// this twice returns [`Error::LoggingInitialized`] instead of panicking.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(LevelFilter::from_level(config.level).into());

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    installed.map_err(|e| Error::LoggingInitialized(e.to_string()))
}

/// Parse a log level from a string such as `"debug"` or `"WARN"`
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(matches!(parse_log_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn test_config_flags() {
        let config = LoggingConfig::new(Level::TRACE, "rental-test")
            .with_json(true)
            .with_file_info(true);
        assert_eq!(config.level, Level::TRACE);
        assert_eq!(config.app_name, "rental-test");
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.file_info);

        let config = config.with_json(false).with_file_info(false);
        assert_eq!(config.format, LogFormat::Text);
        assert!(!config.file_info);
    }

    #[test]
    fn test_second_setup_is_an_error_not_a_panic() {
        let _ = setup_logging(LoggingConfig::default().with_json(true));
        let second = setup_logging(LoggingConfig::default());

        assert!(matches!(second, Err(Error::LoggingInitialized(_))));
    }
}
