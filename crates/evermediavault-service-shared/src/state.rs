//! Application state shared by axum handlers.

use std::sync::Arc;

use crate::config::Settings;
use crate::db::{ConnectivityProbe, DbPool, PoolConfig};

/// Shared application state for all axum handlers.
///
/// Cheaply cloneable (`Arc` inside); share it through axum's `State`
/// extractor. The settings snapshot is never mutated after load.
///
/// # Example
///
/// ```ignore
/// use axum::{extract::State, routing::get, Router};
/// use evermediavault_service_shared::AppState;
///
/// async fn handler(State(state): State<AppState>) -> String {
///     state.settings().app_name.clone()
/// }
///
/// let state = AppState::from_settings(settings);
/// let app: Router = Router::new().route("/name", get(handler)).with_state(state);
/// ```
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    settings: Arc<Settings>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl AppState {
    /// Create state from settings and an explicit readiness probe.
    pub fn new(settings: Settings, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                settings: Arc::new(settings),
                probe,
            }),
        }
    }

    /// Create state backed by a lazily connecting MySQL pool.
    ///
    /// Also returns the pool so callers can run their own queries.
    pub fn from_settings(settings: Settings) -> (Self, DbPool) {
        let pool = DbPool::connect_lazy(&PoolConfig::from_settings(&settings));
        let state = Self::new(settings, Arc::new(pool.clone()));
        (state, pool)
    }

    /// The immutable settings snapshot.
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Shared handle to the settings snapshot.
    pub fn settings_arc(&self) -> Arc<Settings> {
        Arc::clone(&self.inner.settings)
    }

    /// The readiness probe.
    pub fn probe(&self) -> &dyn ConnectivityProbe {
        self.inner.probe.as_ref()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("app_name", &self.inner.settings.app_name)
            .field("environment", &self.inner.settings.environment)
            .finish_non_exhaustive()
    }
}
