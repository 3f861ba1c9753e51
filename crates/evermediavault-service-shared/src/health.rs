//! Health check handlers.
//!
//! Three probes, each answering with a success [`Envelope`]:
//!
//! - `/health`: basic status, version and environment; no dependency checks
//! - `/health/live`: liveness; process-local
//! - `/health/ready`: readiness; runs the database connectivity probe
//!
//! Readiness never fails at the HTTP level. When the probe fails the
//! response is still `200 OK` and the payload reports `not_ready` with the
//! error text, so orchestrators must inspect `data.status`.

use axum::{extract::State, Json};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{check_with_timeout, ProbeError};
use crate::metrics::record_db_probe;
use crate::response::Envelope;
use crate::state::AppState;

/// Health payload carried in `data`.
///
/// Fields a probe does not report are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `healthy`, `alive`, `ready` or `not_ready`.
    pub status: String,

    /// UTC RFC 3339 timestamp with microseconds.
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,

    /// `connected` or `disconnected` (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Probe failure message (readiness only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    fn base(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: utc_timestamp(),
            version: None,
            environment: None,
            database: None,
            error: None,
        }
    }

    pub fn healthy(version: &str, environment: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            environment: Some(environment.to_string()),
            ..Self::base("healthy")
        }
    }

    pub fn alive() -> Self {
        Self::base("alive")
    }

    pub fn ready() -> Self {
        Self {
            database: Some("connected".to_string()),
            ..Self::base("ready")
        }
    }

    pub fn not_ready(error: impl Into<String>) -> Self {
        Self {
            database: Some("disconnected".to_string()),
            error: Some(error.into()),
            ..Self::base("not_ready")
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Current UTC time, e.g. `2025-01-02T03:04:05.123456Z`.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// `GET /health`
///
/// ```text
/// {"success":true,"message":"service is running","data":{"status":"healthy","timestamp":"...","version":"0.1.0","environment":"development"},"detail":null}
/// ```
pub async fn health_basic(State(state): State<AppState>) -> Envelope<HealthStatus> {
    let settings = state.settings();
    Envelope::success(
        "service is running",
        HealthStatus::healthy(&settings.app_version, settings.environment.as_str()),
    )
}

/// `GET /health/live`
pub async fn health_live() -> Envelope<HealthStatus> {
    Envelope::success("service is alive", HealthStatus::alive())
}

/// `GET /health/ready`
///
/// The probe is bounded by `DB_PROBE_TIMEOUT_SECONDS`.
pub async fn health_ready(State(state): State<AppState>) -> Envelope<HealthStatus> {
    let timeout = state.settings().db_probe_timeout();

    match check_with_timeout(state.probe(), timeout).await {
        Ok(()) => {
            record_db_probe("connected");
            Envelope::success("service is ready", HealthStatus::ready())
        }
        Err(err) => {
            record_db_probe(match err {
                ProbeError::TimedOut => "timeout",
                ProbeError::Unavailable(_) => "disconnected",
            });
            tracing::warn!(error = %err, "readiness probe failed");
            Envelope::success("service is not ready", HealthStatus::not_ready(err.to_string()))
        }
    }
}

/// Payload of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootInfo {
    pub message: String,
    pub version: String,
    pub docs_url: Option<String>,
}

/// `GET /`: welcome message, served as bare JSON.
pub async fn root(State(state): State<AppState>) -> Json<RootInfo> {
    let settings = state.settings();
    Json(RootInfo {
        message: format!("Welcome to {}", settings.app_name),
        version: settings.app_version.clone(),
        docs_url: settings.api_docs_url.clone(),
    })
}
