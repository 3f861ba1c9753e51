//! Application error taxonomy.
//!
//! Handlers return [`AppError`]. Its three variants are the three disjoint
//! tiers the exception translation stage understands:
//!
//! - [`AppError::Api`]: a typed [`ApiError`] with its own status and message
//! - [`AppError::Database`]: a failure from the database layer
//! - [`AppError::Unexpected`]: anything else (including panics and timeouts)
//!
//! Converting an `AppError` into a response does not render a body. The
//! response only carries an [`ErrorReport`] extension; rendering the error
//! envelope is left to [`ExceptionLayer`](crate::exception::ExceptionLayer),
//! the single place where failures become wire-level responses.

use std::fmt;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The closed set of typed API failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Unauthorized,
    Forbidden,
    Conflict,
    Internal,
    Database,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::NotFound,
        ErrorKind::BadRequest,
        ErrorKind::Unauthorized,
        ErrorKind::Forbidden,
        ErrorKind::Conflict,
        ErrorKind::Internal,
        ErrorKind::Database,
    ];

    /// HTTP status code for this kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal | ErrorKind::Database => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message used when the caller does not supply one.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "resource not found",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::Unauthorized => "unauthorized access",
            ErrorKind::Forbidden => "access forbidden",
            ErrorKind::Conflict => "resource conflict",
            ErrorKind::Internal => "internal server error",
            ErrorKind::Database => "database operation failed",
        }
    }
}

/// A typed, terminal API failure.
///
/// # Example
///
/// ```
/// use evermediavault_service_shared::{ApiError, ErrorKind};
/// use serde_json::json;
///
/// let err = ApiError::not_found("media item 42 not found").with_detail(json!({"id": 42}));
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.status_code().as_u16(), 404);
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    detail: Option<Value>,
}

impl ApiError {
    /// Create an error of the given kind with its default message.
    pub fn new(kind: ErrorKind) -> Self {
        Self::with_message(kind, kind.default_message())
    }

    /// Create an error of the given kind with a custom message.
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// Attach a detail payload.
    pub fn with_detail(mut self, detail: impl Into<Value>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Forbidden, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Conflict, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Internal, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::with_message(ErrorKind::Database, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    pub fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }
}

/// Error type returned by request handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// A typed API failure; its status, message and detail reach the caller.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A database-layer failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Any other failure.
    #[error("{type_name}: {message}")]
    Unexpected { type_name: String, message: String },
}

impl AppError {
    /// Capture an arbitrary error as an unexpected failure, keeping its type name.
    pub fn unexpected<E>(error: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        Self::Unexpected {
            type_name: short_type_name::<E>().to_string(),
            message: error.to_string(),
        }
    }

    /// An unexpected failure with an explicit type label.
    pub fn unexpected_with(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unexpected {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// HTTP status the translated response will carry.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Api(err) => err.status_code(),
            AppError::Database(_) | AppError::Unexpected { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short type label used in failure logs.
    pub fn type_name(&self) -> &str {
        match self {
            AppError::Api(_) => "ApiError",
            AppError::Database(_) => "DatabaseError",
            AppError::Unexpected { type_name, .. } => type_name,
        }
    }
}

/// Marker stored in a response's extensions when a handler failed.
#[derive(Debug, Clone)]
pub struct ErrorReport(Arc<AppError>);

impl ErrorReport {
    pub fn new(error: AppError) -> Self {
        Self(Arc::new(error))
    }

    pub fn error(&self) -> &AppError {
        &self.0
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = self.status_code().into_response();
        response.extensions_mut().insert(ErrorReport::new(self));
        response
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

/// Last path segment of a type name, without generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes_per_kind() {
        let expected = [404, 400, 401, 403, 409, 500, 500];
        for (kind, code) in ErrorKind::ALL.iter().zip(expected) {
            assert_eq!(kind.status_code().as_u16(), code, "{:?}", kind);
        }
    }

    #[test]
    fn test_default_messages() {
        assert_eq!(ApiError::new(ErrorKind::NotFound).message(), "resource not found");
        assert_eq!(
            ApiError::new(ErrorKind::Database).message(),
            "database operation failed"
        );
    }

    #[test]
    fn test_custom_message_and_detail() {
        let err = ApiError::conflict("name already taken").with_detail(json!({"field": "name"}));

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.message(), "name already taken");
        assert_eq!(err.detail(), Some(&json!({"field": "name"})));
        assert_eq!(err.to_string(), "name already taken");
    }

    #[test]
    fn test_app_error_status() {
        assert_eq!(
            AppError::from(ApiError::forbidden("no")).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::from(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::unexpected_with("panic", "boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unexpected_keeps_type_name() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = AppError::unexpected(&io);

        assert_eq!(err.type_name(), "Error");
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<std::num::ParseIntError>(), "ParseIntError");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn test_into_response_carries_report() {
        let response = AppError::from(ApiError::not_found("missing")).into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert_eq!(report.error().type_name(), "ApiError");
        assert_eq!(report.to_string(), "missing");
    }
}
