//! Request logging middleware.
//!
//! This module provides:
//! - [`RequestId`]: Newtype for generated correlation IDs
//! - [`RequestLoggingLayer`]: Tower middleware that opens the per-request
//!   logging context, times the request and records HTTP metrics
//!
//! # Request ID Propagation
//!
//! Every request gets a fresh UUID v7 (time-sortable). The ID is carried by
//! the request span, so every log line emitted while the request is being
//! handled includes it, and is returned in the `X-Request-ID` header together
//! with `X-Process-Time` (seconds, three decimals).
//!
//! # Metrics Recording
//!
//! The layer records:
//! - `http_requests_total`: Counter by method, route, status bucket
//! - `http_request_duration_seconds`: Histogram by method, route
//!
//! The `path` label is the matched route template (`/users/{id}`), never the
//! raw request path. Requests that match no route share the
//! [`UNMATCHED_PATH_LABEL`] series.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::extract::{ConnectInfo, MatchedPath};
use axum::http::{HeaderName, HeaderValue, Request, Response};
use pin_project_lite::pin_project;
use tower::{Layer, Service};
use tracing::{Level, Span};
use uuid::Uuid;

use crate::error::ErrorReport;
use crate::logging::RequestContext;

/// Response header carrying the request's correlation ID.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Response header carrying the processing time in seconds.
pub const PROCESS_TIME_HEADER: HeaderName = HeaderName::from_static("x-process-time");

/// Newtype wrapper for request correlation IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Create a new request ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a new UUID v7 request ID.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the request ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metric label for requests that matched no route.
pub const UNMATCHED_PATH_LABEL: &str = "unmatched";

/// Route label for metrics: the matched route template, or
/// [`UNMATCHED_PATH_LABEL`].
pub fn route_label<B>(req: &Request<B>) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_PATH_LABEL.to_string())
}

/// Convert HTTP status code to bucket label.
fn status_bucket(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}

/// Severity of a "request failed" line: client errors are warnings.
fn failure_level(status: u16) -> Level {
    if status < 500 {
        Level::WARN
    } else {
        Level::ERROR
    }
}

/// Format a duration in seconds the way `X-Process-Time` reports it.
pub fn format_process_time(seconds: f64) -> String {
    format!("{:.3}", seconds)
}

// =============================================================================
// RequestLoggingLayer - Tower middleware for request logging and timing
// =============================================================================

/// Tower layer for request logging, timing and HTTP metrics.
///
/// Sits outside the exception translation stage, so failures arrive here as
/// translated responses still carrying their [`ErrorReport`].
#[derive(Debug, Clone, Default)]
pub struct RequestLoggingLayer;

impl RequestLoggingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RequestLoggingLayer {
    type Service = RequestLoggingMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLoggingMiddleware { inner }
    }
}

/// Middleware service produced by [`RequestLoggingLayer`].
#[derive(Debug, Clone)]
pub struct RequestLoggingMiddleware<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggingMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: std::fmt::Display,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = RequestLoggingFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let context = RequestContext::begin();

        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let route = route_label(&req);
        let query = req.uri().query().unwrap_or("").to_string();
        let client = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string());
        let user_agent = req
            .headers()
            .get(http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let span = context.span(&method, &path);

        {
            let _enter = span.enter();
            tracing::info!(
                query = %query,
                client = client.as_deref().unwrap_or("-"),
                user_agent = user_agent.as_deref().unwrap_or("-"),
                "request started"
            );
        }

        req.extensions_mut().insert(context.clone());
        let future = self.inner.call(req);

        RequestLoggingFuture {
            inner: future,
            context,
            method,
            route,
            span,
        }
    }
}

pin_project! {
    /// Future wrapper that logs completion and stamps correlation headers.
    pub struct RequestLoggingFuture<F> {
        #[pin]
        inner: F,
        context: RequestContext,
        method: String,
        route: String,
        span: Span,
    }
}

impl<F, ResBody, E> Future for RequestLoggingFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: std::fmt::Display,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _enter = this.span.enter();

        let mut result = match this.inner.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result,
        };

        let duration_secs = this.context.started_at().elapsed().as_secs_f64();
        let process_time = format_process_time(duration_secs);

        match &mut result {
            Ok(response) => {
                let status = response.status().as_u16();

                metrics::counter!(
                    "http_requests_total",
                    "method" => this.method.clone(),
                    "path" => this.route.clone(),
                    "status" => status_bucket(status)
                )
                .increment(1);

                metrics::histogram!(
                    "http_request_duration_seconds",
                    "method" => this.method.clone(),
                    "path" => this.route.clone()
                )
                .record(duration_secs);

                match response.extensions().get::<ErrorReport>() {
                    Some(report) if failure_level(status) == Level::WARN => tracing::warn!(
                        status = status,
                        error = %report.error(),
                        error_type = report.error().type_name(),
                        process_time = %process_time,
                        "request failed"
                    ),
                    Some(report) => tracing::error!(
                        status = status,
                        error = %report.error(),
                        error_type = report.error().type_name(),
                        process_time = %process_time,
                        "request failed"
                    ),
                    None => tracing::info!(
                        status = status,
                        process_time = %process_time,
                        "request completed"
                    ),
                }

                let headers = response.headers_mut();
                if let Ok(value) = HeaderValue::from_str(this.context.request_id().as_str()) {
                    headers.insert(REQUEST_ID_HEADER, value);
                }
                if let Ok(value) = HeaderValue::from_str(&process_time) {
                    headers.insert(PROCESS_TIME_HEADER, value);
                }
            }
            Err(error) => {
                metrics::counter!(
                    "http_requests_total",
                    "method" => this.method.clone(),
                    "path" => this.route.clone(),
                    "status" => "5xx"
                )
                .increment(1);

                tracing::error!(
                    error = %error,
                    process_time = %process_time,
                    "request failed"
                );
            }
        }

        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_generate() {
        let id1 = RequestId::generate();
        let id2 = RequestId::generate();

        assert_ne!(id1, id2);

        // Canonical hyphenated UUID
        assert_eq!(id1.as_str().len(), 36);
        assert!(Uuid::parse_str(id1.as_str()).is_ok());
    }

    #[test]
    fn test_request_id_is_v7() {
        let id = RequestId::generate();
        let uuid = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(uuid.get_version_num(), 7);
    }

    #[test]
    fn test_request_id_display() {
        let id = RequestId::new("req-1");
        assert_eq!(id.to_string(), "req-1");
    }

    #[test]
    fn test_route_label_without_match_is_fixed() {
        let first = Request::get("/scan/1").body(()).unwrap();
        let second = Request::get("/wp-admin/setup.php?x=1").body(()).unwrap();

        assert_eq!(route_label(&first), UNMATCHED_PATH_LABEL);
        assert_eq!(route_label(&second), UNMATCHED_PATH_LABEL);
    }

    #[test]
    fn test_status_bucket() {
        assert_eq!(status_bucket(200), "2xx");
        assert_eq!(status_bucket(301), "3xx");
        assert_eq!(status_bucket(404), "4xx");
        assert_eq!(status_bucket(500), "5xx");
        assert_eq!(status_bucket(103), "other");
    }

    #[test]
    fn test_failure_level() {
        assert_eq!(failure_level(404), Level::WARN);
        assert_eq!(failure_level(409), Level::WARN);
        assert_eq!(failure_level(500), Level::ERROR);
        assert_eq!(failure_level(503), Level::ERROR);
    }

    #[test]
    fn test_format_process_time() {
        assert_eq!(format_process_time(0.0), "0.000");
        assert_eq!(format_process_time(0.12345), "0.123");
        assert_eq!(format_process_time(2.0), "2.000");
    }
}
