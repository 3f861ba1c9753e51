//! Evermediavault HTTP API service.
//!
//! # Endpoints
//!
//! - `GET /` - Welcome message, version and docs URL
//! - `GET /health` - Basic health status (also under `API_V1_PREFIX`)
//! - `GET /health/live` - Liveness probe (also under `API_V1_PREFIX`)
//! - `GET /health/ready` - Readiness probe with database check (also under `API_V1_PREFIX`)
//! - `GET /metrics` - Prometheus metrics endpoint (`METRICS_PATH`)
//!
//! # Configuration
//!
//! Read from the environment, optionally hydrated from `.env`. See
//! [`Settings`] for every variable and its default. The most common:
//!
//! - `HOST` / `PORT` - Listen address (default: `0.0.0.0:8000`)
//! - `ENVIRONMENT` - `development`, `staging`, `production` or `testing`
//! - `LOG_LEVEL` / `LOG_FORMAT` - Logging verbosity and `json` or `console` output
//! - `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` - MySQL connection

use std::net::SocketAddr;

use tokio::signal;
use tracing::{error, info, warn};

use evermediavault_service_shared::{
    build_router, init_logging, init_metrics, AppState, LoggingConfig, MetricsConfig, Settings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load()?;

    init_logging(&LoggingConfig::from_settings(&settings));
    settings.log_fallbacks();

    if let Err(e) = init_metrics(&MetricsConfig::from_settings(&settings)) {
        // Metrics are optional.
        warn!(error = %e, "failed to initialize metrics, continuing without metrics");
    }

    info!(
        app = %settings.app_name,
        version = %settings.app_version,
        environment = %settings.environment,
        debug = settings.debug,
        "application starting"
    );

    let addr = settings.bind_address();
    let (state, pool) = AppState::from_settings(settings);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "failed to bind listener");
        e
    })?;
    info!(addr = %addr, "listening on");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pool.pool().close().await;
    info!("application stopped");

    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received shutdown signal, draining connections");
}
