use serde::{Deserialize, Serialize};
use std::io;
use tracing::Level;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (text, json, compact)
    pub format: LogFormat,
    /// Whether to include file and line numbers
    pub include_location: bool,
    /// Whether to emit span open/close events
    pub include_spans: bool,
    /// Whether to colour output by severity
    pub ansi: bool,
}

/// Log output formats
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact text format
    Compact,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            include_location: false,
            include_spans: false,
            ansi: true,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> crate::Result<()> {
    parse_log_level(&config.level)?;

    // RUST_LOG wins; otherwise keep dependencies at warn and our crates at the configured level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,dbrefresh_core={0},dbrefresh={0}",
            config.level
        ))
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    let span_events = if config.include_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    match config.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(config.ansi)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_span_events(span_events)
                .with_writer(io::stderr);

            registry.with(layer).try_init().map_err(|e| {
                crate::RefreshError::config(format!("Failed to initialize logging: {}", e))
            })?;
        }
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_target(true)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_span_events(span_events)
                .with_writer(io::stderr);

            registry.with(layer).try_init().map_err(|e| {
                crate::RefreshError::config(format!("Failed to initialize logging: {}", e))
            })?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_target(false)
                .with_ansi(config.ansi)
                .with_writer(io::stderr);

            registry.with(layer).try_init().map_err(|e| {
                crate::RefreshError::config(format!("Failed to initialize logging: {}", e))
            })?;
        }
    }

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        "Logging initialized"
    );

    Ok(())
}

/// Parse log level string to tracing Level
pub fn parse_log_level(level: &str) -> crate::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(crate::RefreshError::validation(format!(
            "Invalid log level: {}. Valid levels are: trace, debug, info, warn, error",
            level
        ))),
    }
}

/// Identifier attached to every log line of one refresh run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId(String);

impl RunId {
    /// Generate a new run ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the run ID as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Structured logging context for one command invocation
pub struct LogContext {
    run_id: RunId,
    operation: String,
}

impl LogContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            operation: operation.into(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Create a tracing span for this context
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "run",
            run_id = %self.run_id,
            operation = %self.operation
        )
    }

    pub fn info(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::info!("{}", message);
    }

    pub fn error(&self, message: &str) {
        let _guard = self.span().entered();
        tracing::error!("{}", message);
    }
}

/// Configure logging for the command line tool
pub fn init_cli_logging(verbose: bool) -> crate::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let format = match std::env::var("DBREFRESH_LOG_FORMAT").as_deref() {
        Ok("json") => LogFormat::Json,
        Ok("compact") => LogFormat::Compact,
        _ => LogFormat::Text,
    };
    let config = LogConfig {
        level: default_level.to_string(),
        format,
        include_location: verbose,
        include_spans: false,
        ansi: true,
    };
    init_logging(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert!(parse_log_level("debug").is_ok());
        assert!(parse_log_level("warn").is_ok());
        assert!(parse_log_level("DEBUG").is_ok()); // case insensitive
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn test_run_id_unique() {
        let id1 = RunId::new();
        let id2 = RunId::new();
        assert_ne!(id1.as_str(), id2.as_str());
    }

    #[test]
    fn test_log_context() {
        let context = LogContext::new("refresh");
        assert_eq!(context.operation(), "refresh");
        assert!(!context.run_id().as_str().is_empty());
    }

    #[test]
    fn test_log_config_serialization() {
        let config = LogConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: LogConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.level, deserialized.level);
        assert!(matches!(deserialized.format, LogFormat::Text));
    }
}
