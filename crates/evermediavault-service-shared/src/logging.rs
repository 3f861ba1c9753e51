//! Structured logging infrastructure for the Evermediavault service.
//!
//! This module provides:
//! - [`LoggingConfig`]: Configuration for the logging system
//! - [`init_logging`]: Install the global `tracing` subscriber once
//! - [`RequestContext`]: Per-request correlation data threaded through the
//!   request instead of process-wide logger bindings
//!
//! # Output shape
//!
//! JSON records are emitted when `LOG_FORMAT=json` or the environment is
//! `production`; otherwise a human-readable rendering with the same fields is
//! used. `RUST_LOG`, when set, overrides the configured level.
//!
//! # Example
//!
//! ```no_run
//! use evermediavault_service_shared::logging::{init_logging, LoggingConfig};
//! use evermediavault_service_shared::Settings;
//!
//! let settings = Settings::load().unwrap();
//! init_logging(&LoggingConfig::from_settings(&settings));
//! ```

use std::time::Instant;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogLevel, Settings};
use crate::middleware::RequestId;

/// Set once the global subscriber has been installed.
static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging (default, production).
    #[default]
    Json,
    /// Human-readable text logging (development).
    Text,
}

impl LogFormat {
    /// Parse log format from string.
    ///
    /// Only "json" (case-insensitive) selects `Json`; every other value,
    /// including "console" and "text", is human-readable.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Output format (json or text).
    pub format: LogFormat,
    /// Log level filter (e.g., "info", "debug", "warn").
    pub level: String,
    /// Service name to include in the startup record.
    pub service: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: LogLevel::Info.filter_directive().to_string(),
            service: None,
        }
    }
}

impl LoggingConfig {
    /// Derive the logging configuration from application settings.
    ///
    /// Production always logs JSON regardless of `LOG_FORMAT`.
    pub fn from_settings(settings: &Settings) -> Self {
        let format = if settings.is_production() {
            LogFormat::Json
        } else {
            LogFormat::parse(&settings.log_format)
        };

        Self {
            format,
            level: settings.log_level.filter_directive().to_string(),
            service: Some(settings.app_name.clone()),
        }
    }

    /// Create a new configuration with the specified service name.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Installs the process-wide subscriber on the first call and returns `true`.
/// Later calls leave the existing subscriber in place and return `false`.
/// Call it before the server starts accepting traffic.
///
/// # JSON Format
///
/// ```json
/// {"timestamp":"2025-12-30T10:00:00.000000Z","level":"INFO","fields":{"message":"request completed","status":200},"target":"evermediavault_service_shared::middleware","span":{"request_id":"0193...","name":"request"}}
/// ```
///
/// # Text Format
///
/// ```text
/// 2025-12-30T10:00:00.000000Z  INFO evermediavault_service_shared::middleware: request completed
/// ```
pub fn init_logging(config: &LoggingConfig) -> bool {
    let mut installed = false;
    INITIALIZED.get_or_init(|| {
        installed = install_subscriber(config);
    });
    installed
}

fn install_subscriber(config: &LoggingConfig) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Text => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => {
            // Current span carries the request_id field.
            let json_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false);

            registry.with(json_layer).try_init()
        }
    };

    if result.is_ok() {
        tracing::info!(
            service = config.service.as_deref().unwrap_or("-"),
            format = ?config.format,
            level = %config.level,
            "logging initialized"
        );
    }
    result.is_ok()
}

/// Correlation data for a single in-flight request.
///
/// Created by the request logging middleware and stored in the request's
/// extensions, so handlers can read it with
/// `Extension<RequestContext>`. It lives exactly as long as the request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    started_at: Instant,
}

impl RequestContext {
    /// Start a new context with a freshly generated request ID.
    pub fn begin() -> Self {
        Self {
            request_id: RequestId::generate(),
            started_at: Instant::now(),
        }
    }

    /// The request's correlation ID.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Monotonic start instant of the request.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Span binding the request ID to every event recorded inside it.
    pub fn span(&self, method: &str, path: &str) -> Span {
        info_span!(
            "request",
            request_id = %self.request_id,
            method = %method,
            path = %path,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("text"), LogFormat::Text);
        assert_eq!(LogFormat::parse("console"), LogFormat::Text);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Text);
        assert_eq!(LogFormat::parse(" json "), LogFormat::Json);
        assert_eq!(LogFormat::parse("unknown"), LogFormat::Text);
        assert_eq!(LogFormat::parse(""), LogFormat::Text);
    }

    #[test]
    fn test_unrecognised_format_is_human_readable_outside_production() {
        let settings = Settings::from_lookup(|key| match key {
            "LOG_FORMAT" => Some("plain".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(settings.is_development());
        assert_eq!(LoggingConfig::from_settings(&settings).format, LogFormat::Text);

        let production = Settings::from_lookup(|key| match key {
            "LOG_FORMAT" => Some("plain".to_string()),
            "ENVIRONMENT" => Some("production".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(LoggingConfig::from_settings(&production).format, LogFormat::Json);
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "info");
        assert!(config.service.is_none());
    }

    #[test]
    fn test_console_format_in_development() {
        let settings = Settings::from_lookup(|key| match key {
            "LOG_FORMAT" => Some("console".to_string()),
            "LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        })
        .unwrap();

        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "debug");
        assert_eq!(config.service.as_deref(), Some("Evermediavault API"));
    }

    #[test]
    fn test_production_forces_json() {
        let settings = Settings::from_lookup(|key| match key {
            "LOG_FORMAT" => Some("console".to_string()),
            "ENVIRONMENT" => Some("production".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(LoggingConfig::from_settings(&settings).format, LogFormat::Json);
    }

    #[test]
    fn test_logging_config_with_service() {
        let config = LoggingConfig::default().with_service("api");
        assert_eq!(config.service, Some("api".to_string()));
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        let config = LoggingConfig::default();
        init_logging(&config);
        assert!(!init_logging(&config));
    }

    #[test]
    fn test_request_contexts_are_distinct() {
        let a = RequestContext::begin();
        let b = RequestContext::begin();
        assert_ne!(a.request_id(), b.request_id());
        assert!(b.started_at() >= a.started_at());
    }
}
