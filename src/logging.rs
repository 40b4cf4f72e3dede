//! Logging setup: log format (text or JSON) and log level (trace..error), driven by
//! `tracing` + `tracing-subscriber`, the same pairing used throughout this codebase.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

#[derive(Default, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Default, Copy, Clone, Debug, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
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

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("invalid log level: {}", s)),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("invalid log format: {}", s)),
        }
    }
}

#[derive(Default, Debug, Clone, Deserialize)]
pub struct Logger {
    pub log_format: LogFormat,
    pub log_level: LogLevel,
}

impl Logger {
    pub fn new(log_format: LogFormat, log_level: LogLevel) -> Self {
        Self {
            log_format,
            log_level,
        }
    }

    fn filter(&self) -> EnvFilter {
        let requested_level = if let Ok(rust_log) = std::env::var("RUST_LOG") {
            // If the user provides a complex filter (e.g. "stagehand=debug,tokio=warn"),
            // we trust they know what they are doing and respect it.
            if rust_log.contains(',') || rust_log.contains('=') {
                return EnvFilter::new(rust_log);
            }
            rust_log
        } else {
            self.log_level.as_str().to_string()
        };
        let directives = format!("info,stagehand={}", requested_level);
        EnvFilter::new(directives)
    }

    pub fn init(&self) -> Result<(), LoggingError> {
        let filter = self.filter();
        match self.log_format {
            LogFormat::Json => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_current_span(false))
                .try_init()
                .map_err(LoggingError::from),
            LogFormat::Text => tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_target(false))
                .try_init()
                .map_err(LoggingError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_round_trips_through_str() {
        assert_eq!(LogLevel::from_str("debug").unwrap().as_str(), "debug");
        assert!(LogLevel::from_str("nonsense").is_err());
    }

    #[test]
    fn log_format_round_trips_through_str() {
        assert_eq!(LogFormat::from_str("json").unwrap().as_str(), "json");
        assert!(LogFormat::from_str("nonsense").is_err());
    }
}
