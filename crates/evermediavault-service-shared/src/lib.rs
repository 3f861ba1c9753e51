//! Shared infrastructure for the Evermediavault HTTP API service.
//!
//! - [`Settings`]: environment-driven configuration snapshot
//! - [`logging`]: structured `tracing` setup and per-request context
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`Envelope`] / [`ErrorResponse`] / [`PaginatedResponse`]: uniform response shapes
//! - [`ApiError`] / [`AppError`]: the error taxonomy handlers return
//! - [`middleware`] / [`exception`]: request logging and exception translation
//! - [`db`]: MySQL pool, connectivity probe and units of work
//! - [`health`]: basic, liveness and readiness probes
//! - [`build_router`]: routes plus the full middleware pipeline
//!
//! # Architecture
//!
//! Handlers stay thin. They return `Result<Envelope<T>, AppError>`; the
//! pipeline owns everything cross-cutting:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Compression → RequestLogging → ExceptionTranslation        │
//! │    → CORS → CatchPanic → Timeout → axum handler             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module provides stub probes and test settings. Enable
//! the `test-utils` feature to access it from dependent crates.

pub mod config;
pub mod cors;
pub mod db;
mod error;
pub mod exception;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod response;
mod router;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{ConfigError, ConfigFallback, Environment, LogLevel, Settings};
pub use cors::cors_layer;
pub use db::{ConnectivityProbe, DbPool, Model, PoolConfig, PoolError, ProbeError};
pub use error::{ApiError, AppError, ErrorKind, ErrorReport};
pub use exception::ExceptionLayer;
pub use health::{health_basic, health_live, health_ready, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig, RequestContext};
pub use metrics::{init_metrics, metrics_handler, MetricsConfig, MetricsError};
pub use middleware::{RequestId, RequestLoggingLayer, PROCESS_TIME_HEADER, REQUEST_ID_HEADER};
pub use response::{Envelope, ErrorResponse, PaginatedResponse, PaginationMeta, Timestamps};
pub use router::{app_routes, build_router, with_pipeline};
pub use state::AppState;
