//! Test fixtures for handler and pipeline testing.
//!
//! Everything here works without a database or process environment changes:
//! settings come from [`Settings::from_lookup`] and readiness is driven by
//! stub probes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Settings;
use crate::db::{ConnectivityProbe, ProbeError};
use crate::state::AppState;

/// Probe that always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthyProbe;

#[async_trait]
impl ConnectivityProbe for HealthyProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        Ok(())
    }
}

/// Probe that always fails with the given message.
#[derive(Debug, Clone)]
pub struct FailingProbe {
    message: String,
}

impl FailingProbe {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for FailingProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        Err(ProbeError::Unavailable(self.message.clone()))
    }
}

/// Probe that never answers within any reasonable timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct HangingProbe;

#[async_trait]
impl ConnectivityProbe for HangingProbe {
    async fn check(&self) -> Result<(), ProbeError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

/// Default settings in the `testing` environment.
pub fn test_settings() -> Settings {
    test_settings_with(&[])
}

/// Testing settings with extra variables applied on top.
///
/// # Panics
///
/// Panics if a supplied value is malformed.
pub fn test_settings_with(vars: &[(&str, &str)]) -> Settings {
    let vars: Vec<(String, String)> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Settings::from_lookup(|key| {
        vars.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .or_else(|| (key == "ENVIRONMENT").then(|| "testing".to_string()))
    })
    .unwrap_or_else(|e| panic!("invalid test settings: {}", e))
}

/// State with test settings and a healthy probe.
pub fn test_state() -> AppState {
    AppState::new(test_settings(), Arc::new(HealthyProbe))
}

/// State with the given settings and probe.
pub fn test_state_with(settings: Settings, probe: impl ConnectivityProbe + 'static) -> AppState {
    AppState::new(settings, Arc::new(probe))
}
