//! Route table and middleware pipeline assembly.
//!
//! Requests pass through the pipeline outermost first:
//!
//! ```text
//! Compression (gzip, bodies >= 1000 bytes)
//!   -> RequestLoggingLayer   request id, timing, X-Request-ID / X-Process-Time
//!     -> ExceptionLayer      ErrorReport -> ErrorResponse envelope
//!       -> CorsLayer
//!         -> CatchPanicLayer panic -> AppError::Unexpected("panic")
//!           -> Timeout       elapsed -> AppError::Unexpected("timeout")
//!             -> routes
//! ```

use std::any::Any;

use axum::error_handling::HandleErrorLayer;
use axum::http::Uri;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{BoxError, Router};
use serde_json::json;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::CompressionLayer;

use crate::config::Settings;
use crate::cors::cors_layer;
use crate::error::{ApiError, AppError, ErrorKind};
use crate::exception::ExceptionLayer;
use crate::health::{health_basic, health_live, health_ready, root};
use crate::metrics::{metrics_handler, MetricsConfig};
use crate::middleware::RequestLoggingLayer;
use crate::state::AppState;

/// Responses smaller than this are sent uncompressed.
pub const COMPRESSION_MIN_SIZE: u16 = 1000;

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_basic))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
}

/// Route table without middleware.
///
/// Health routes are served both at the root and under `API_V1_PREFIX`;
/// the metrics endpoint is unprefixed and only mounted when enabled.
pub fn app_routes(settings: &Settings) -> Router<AppState> {
    let mut router = Router::new().route("/", get(root)).merge(health_routes());

    if let Some(prefix) = settings.api_prefix() {
        router = router.nest(&prefix, health_routes());
    }

    let metrics = MetricsConfig::from_settings(settings);
    if metrics.enabled {
        router = router.route(&metrics.path, get(metrics_handler));
    }

    router
}

/// Wrap `router` in the request pipeline and install the 404 fallback.
pub fn with_pipeline(router: Router<AppState>, settings: &Settings) -> Router<AppState> {
    router.fallback(not_found).layer(
        ServiceBuilder::new()
            .layer(CompressionLayer::new().compress_when(SizeAbove::new(COMPRESSION_MIN_SIZE)))
            .layer(RequestLoggingLayer::new())
            .layer(ExceptionLayer::new(settings.debug))
            .layer(cors_layer(settings))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(HandleErrorLayer::new(handle_timeout_error))
            .layer(TimeoutLayer::new(settings.request_timeout())),
    )
}

/// The complete application: routes, pipeline and state.
pub fn build_router(state: AppState) -> Router {
    let settings = state.settings_arc();
    with_pipeline(app_routes(&settings), &settings).with_state(state)
}

/// Fallback for unmatched routes.
async fn not_found(uri: Uri) -> ApiError {
    ApiError::new(ErrorKind::NotFound).with_detail(json!({ "path": uri.path() }))
}

async fn handle_timeout_error(err: BoxError) -> AppError {
    if err.is::<Elapsed>() {
        AppError::unexpected_with("timeout", "request timed out")
    } else {
        AppError::unexpected_with("BoxError", err.to_string())
    }
}

fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };

    AppError::unexpected_with("panic", message).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorReport;

    #[test]
    fn test_panic_payloads_become_reports() {
        let response = handle_panic(Box::new("boom"));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.error().type_name(), "panic");
        assert!(report.to_string().contains("boom"));

        let response = handle_panic(Box::new(String::from("owned boom")));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.to_string().contains("owned boom"));

        let response = handle_panic(Box::new(42_u8));
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.to_string().contains("handler panicked"));
    }

    #[tokio::test]
    async fn test_elapsed_maps_to_timeout() {
        let err = handle_timeout_error(Box::new(Elapsed::new())).await;
        assert_eq!(err.type_name(), "timeout");
        assert_eq!(err.status_code().as_u16(), 500);
    }

    #[tokio::test]
    async fn test_other_box_errors_are_unexpected() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "broken");
        let err = handle_timeout_error(Box::new(io)).await;
        assert_eq!(err.type_name(), "BoxError");
    }
}
