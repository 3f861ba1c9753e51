//! Prometheus metrics for the Evermediavault service.
//!
//! This module provides:
//! - [`MetricsConfig`]: whether metrics are collected and where they are served
//! - [`init_metrics`]: install the Prometheus recorder
//! - [`metrics_handler`]: axum handler rendering the exposition text
//! - [`record_db_probe`]: readiness probe outcomes
//!
//! HTTP request counters and latency histograms are recorded by
//! [`RequestLoggingLayer`](crate::middleware::RequestLoggingLayer).
//!
//! # Example
//!
//! ```no_run
//! use evermediavault_service_shared::metrics::{init_metrics, MetricsConfig};
//! use evermediavault_service_shared::Settings;
//!
//! let settings = Settings::load().unwrap();
//! if let Err(err) = init_metrics(&MetricsConfig::from_settings(&settings)) {
//!     eprintln!("continuing without metrics: {err}");
//! }
//! ```

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Configuration for the metrics system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled.
    pub enabled: bool,
    /// Path for the metrics endpoint (e.g., "/metrics").
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/metrics".to_string(),
        }
    }
}

impl MetricsConfig {
    /// Read `METRICS_ENABLED` / `METRICS_PATH` from settings.
    ///
    /// A path without a leading slash gets one.
    pub fn from_settings(settings: &Settings) -> Self {
        let trimmed = settings.metrics_path.trim();
        let path = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        Self {
            enabled: settings.metrics_enabled,
            path,
        }
    }
}

/// Errors that can occur during metrics initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("metrics are disabled")]
    Disabled,
    #[error("metrics recorder already initialized")]
    AlreadyInitialized,
    #[error("failed to install metrics recorder: {0}")]
    InstallFailed(String),
}

/// Install the Prometheus recorder.
///
/// Call once at startup, before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if metrics are disabled, the recorder is already
/// installed, or the Prometheus builder fails.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Err(MetricsError::Disabled);
    }

    if PROMETHEUS_HANDLE.get().is_some() {
        return Err(MetricsError::AlreadyInitialized);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::InstallFailed(e.to_string()))?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!(path = %config.path, "metrics recorder installed");
    Ok(())
}

/// The installed Prometheus handle, if any.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Axum handler for the metrics endpoint.
///
/// Returns Prometheus exposition format text.
pub async fn metrics_handler() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|h| h.render())
        .unwrap_or_else(|| "# Metrics not initialized\n".to_string())
}

/// Record one readiness probe.
///
/// Increments `evermediavault_db_probe_total{outcome}`; outcome is
/// `connected`, `disconnected` or `timeout`.
pub fn record_db_probe(outcome: &'static str) {
    metrics::counter!("evermediavault_db_probe_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_default() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert_eq!(config.path, "/metrics");
    }

    #[test]
    fn test_metrics_config_from_settings() {
        let settings = Settings::from_lookup(|key| match key {
            "METRICS_ENABLED" => Some("false".to_string()),
            "METRICS_PATH" => Some("internal/metrics".to_string()),
            _ => None,
        })
        .unwrap();

        let config = MetricsConfig::from_settings(&settings);
        assert!(!config.enabled);
        assert_eq!(config.path, "/internal/metrics");
    }

    #[test]
    fn test_disabled_metrics_are_not_installed() {
        let config = MetricsConfig {
            enabled: false,
            path: "/metrics".to_string(),
        };
        assert_eq!(init_metrics(&config), Err(MetricsError::Disabled));
    }

    #[test]
    fn test_metrics_error_display() {
        assert_eq!(MetricsError::Disabled.to_string(), "metrics are disabled");
        assert!(MetricsError::InstallFailed("boom".to_string())
            .to_string()
            .contains("boom"));
    }

    #[test]
    fn test_record_db_probe_without_recorder() {
        // No recorder installed: recording is a no-op.
        record_db_probe("connected");
    }

    #[tokio::test]
    async fn test_metrics_handler_renders_text() {
        let body = metrics_handler().await;
        assert!(!body.is_empty());
    }
}
