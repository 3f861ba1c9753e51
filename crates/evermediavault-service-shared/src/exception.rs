//! Exception translation middleware.
//!
//! Turns every failed handler into a uniform [`ErrorResponse`] envelope.
//! A failure is recognised by the [`ErrorReport`] extension that
//! [`AppError`]'s `IntoResponse` implementation attaches. Successful
//! responses pass through untouched.
//!
//! Translation tiers, checked in order:
//!
//! | Tier | Status | Message | Detail |
//! |------|--------|---------|--------|
//! | [`AppError::Api`] | the error's own | the error's own | the error's own |
//! | [`AppError::Database`] | 500 | `database operation failed` | error text when debug |
//! | [`AppError::Unexpected`] | 500 | `internal server error` | error text when debug |

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::response::IntoResponse;
use axum::BoxError;
use bytes::Bytes;
use pin_project_lite::pin_project;
use serde_json::Value;
use tower::{Layer, Service};

use crate::error::{AppError, ErrorReport};
use crate::response::ErrorResponse;

/// Tower layer that renders [`ErrorReport`]s as error envelopes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionLayer {
    debug: bool,
}

impl ExceptionLayer {
    /// `debug` controls whether database and unexpected failures expose their
    /// error text in `detail`.
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl<S> Layer<S> for ExceptionLayer {
    type Service = ExceptionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ExceptionMiddleware {
            inner,
            debug: self.debug,
        }
    }
}

/// Middleware service produced by [`ExceptionLayer`].
#[derive(Debug, Clone)]
pub struct ExceptionMiddleware<S> {
    inner: S,
    debug: bool,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ExceptionMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = ExceptionFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        ExceptionFuture {
            inner: self.inner.call(req),
            debug: self.debug,
        }
    }
}

pin_project! {
    /// Future that translates a reported failure once the inner service answers.
    pub struct ExceptionFuture<F> {
        #[pin]
        inner: F,
        debug: bool,
    }
}

impl<F, ResBody, E> Future for ExceptionFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Output = Result<Response<Body>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = match this.inner.poll(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(result) => result?,
        };

        let report = response.extensions().get::<ErrorReport>().cloned();
        let response = match report {
            Some(report) => translate(response, &report, *this.debug),
            None => response.map(Body::new),
        };

        Poll::Ready(Ok(response))
    }
}

/// Build the error envelope for a reported failure.
///
/// Logs the failure at the severity its tier calls for.
pub fn render_error(error: &AppError, debug: bool) -> ErrorResponse {
    match error {
        AppError::Api(err) => {
            tracing::warn!(
                status = err.status_code().as_u16(),
                kind = ?err.kind(),
                message = err.message(),
                "api error"
            );
            ErrorResponse::new(err.status_code(), err.message(), err.detail().cloned())
        }
        AppError::Database(err) => {
            tracing::error!(error = %err, "database error");
            ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "database operation failed",
                debug.then(|| Value::String(err.to_string())),
            )
        }
        AppError::Unexpected { type_name, message } => {
            tracing::error!(
                error_type = %type_name,
                error = %message,
                "unexpected error"
            );
            ErrorResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
                debug.then(|| Value::String(format!("{}: {}", type_name, message))),
            )
        }
    }
}

/// Replace the response's status and body with the rendered envelope.
///
/// Headers set by inner layers (CORS in particular) and the report extension
/// are kept.
fn translate<B>(response: Response<B>, report: &ErrorReport, debug: bool) -> Response<Body> {
    let (mut parts, _) = response.into_parts();
    let (rendered, body) = render_error(report.error(), debug)
        .into_response()
        .into_parts();

    parts.status = rendered.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    if let Some(content_type) = rendered.headers.get(header::CONTENT_TYPE) {
        parts
            .headers
            .insert(header::CONTENT_TYPE, content_type.clone());
    }

    Response::from_parts(parts, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ErrorKind};
    use serde_json::json;

    #[test]
    fn test_api_tier_keeps_status_message_and_detail() {
        let err = AppError::from(ApiError::not_found("media 9 missing").with_detail(json!({"id": 9})));

        for debug in [false, true] {
            let body = render_error(&err, debug);
            assert_eq!(body.status_code, 404);
            assert_eq!(body.message, "media 9 missing");
            assert_eq!(body.detail, Some(json!({"id": 9})));
            assert!(!body.success);
            assert!(body.data.is_none());
        }
    }

    #[test]
    fn test_database_tier_hides_detail_unless_debug() {
        let err = AppError::from(sqlx::Error::PoolTimedOut);

        let quiet = render_error(&err, false);
        assert_eq!(quiet.status_code, 500);
        assert_eq!(quiet.message, "database operation failed");
        assert!(quiet.detail.is_none());

        let verbose = render_error(&err, true);
        assert!(verbose.detail.is_some());
    }

    #[test]
    fn test_unexpected_tier_hides_detail_unless_debug() {
        let err = AppError::unexpected_with("panic", "boom");

        let quiet = render_error(&err, false);
        assert_eq!(quiet.status_code, 500);
        assert_eq!(quiet.message, "internal server error");
        assert!(quiet.detail.is_none());

        let verbose = render_error(&err, true);
        assert_eq!(verbose.detail, Some(json!("panic: boom")));
    }

    #[test]
    fn test_every_kind_maps_to_its_status() {
        for kind in ErrorKind::ALL {
            let body = render_error(&AppError::from(ApiError::new(kind)), false);
            assert_eq!(body.status_code, kind.status_code().as_u16());
            assert_eq!(body.message, kind.default_message());
        }
    }

    #[test]
    fn test_translate_keeps_headers_and_report() {
        let mut response = AppError::from(ApiError::conflict("dup")).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            "http://localhost:3000".parse().unwrap(),
        );
        let report = response.extensions().get::<ErrorReport>().cloned().unwrap();

        let translated = translate(response, &report, false);

        assert_eq!(translated.status(), StatusCode::CONFLICT);
        assert_eq!(
            translated.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert!(translated
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert!(translated.extensions().get::<ErrorReport>().is_some());
    }
}
