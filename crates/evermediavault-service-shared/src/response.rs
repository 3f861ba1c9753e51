//! Uniform response envelopes.
//!
//! Every endpoint answers with one of these shapes:
//!
//! - [`Envelope`]: `{success, message, data, detail}`
//! - [`ErrorResponse`]: the envelope plus `status_code`, with `data` always null
//! - [`PaginatedResponse`]: a list payload plus [`PaginationMeta`]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Success envelope wrapping a payload.
///
/// `data` and `detail` serialize as `null` when absent.
///
/// # Example
///
/// ```
/// use evermediavault_service_shared::Envelope;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Item {
///     id: u64,
/// }
///
/// let body = Envelope::success("item loaded", Item { id: 7 });
/// let json = serde_json::to_value(&body).unwrap();
/// assert_eq!(json["success"], true);
/// assert_eq!(json["data"]["id"], 7);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the request succeeded.
    pub success: bool,

    /// Human-readable outcome message.
    pub message: String,

    /// The payload.
    pub data: Option<T>,

    /// Optional extra information.
    pub detail: Option<Value>,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            detail: None,
        }
    }

    /// Successful envelope carrying `data` and a detail payload.
    pub fn success_with_detail(message: impl Into<String>, data: T, detail: Value) -> Self {
        Self {
            detail: Some(detail),
            ..Self::success(message, data)
        }
    }

    /// Successful envelope without a payload.
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            detail: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error envelope.
///
/// Produced only by the exception translation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    /// Always null; present so error bodies share the envelope shape.
    pub data: Option<Value>,
    pub detail: Option<Value>,
    pub status_code: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>, detail: Option<Value>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            detail,
            status_code: status.as_u16(),
        }
    }

    /// HTTP status carried by this envelope.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    /// Current page, starting at 1.
    pub page: u64,
    /// Items per page, at least 1.
    pub page_size: u64,
    /// Total number of items.
    pub total: u64,
    /// `ceil(total / page_size)`, or 0 when there are no items.
    pub total_pages: u64,
}

impl PaginationMeta {
    /// Build metadata, deriving `total_pages`.
    ///
    /// Inputs are expected to be validated by the caller (`page >= 1`,
    /// `page_size >= 1`). A zero `page_size` yields zero pages rather than
    /// dividing by zero.
    pub fn create(page: u64, page_size: u64, total: u64) -> Self {
        let total_pages = if total > 0 && page_size > 0 {
            total.div_ceil(page_size)
        } else {
            0
        };

        Self {
            page,
            page_size,
            total,
            total_pages,
        }
    }
}

/// Success envelope for paginated lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Vec<T>,
    pub detail: Option<Value>,
    pub meta: Option<PaginationMeta>,
}

impl<T> PaginatedResponse<T> {
    pub fn new(message: impl Into<String>, data: Vec<T>, meta: PaginationMeta) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            detail: None,
            meta: Some(meta),
        }
    }
}

impl<T: Serialize> IntoResponse for PaginatedResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Creation/update timestamps shared by payload schemas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pagination_total_pages() {
        assert_eq!(PaginationMeta::create(2, 10, 95).total_pages, 10);
        assert_eq!(PaginationMeta::create(1, 10, 0).total_pages, 0);
        assert_eq!(PaginationMeta::create(1, 10, 10).total_pages, 1);
        assert_eq!(PaginationMeta::create(1, 10, 11).total_pages, 2);
        assert_eq!(PaginationMeta::create(1, 1, 7).total_pages, 7);
    }

    #[test]
    fn test_pagination_ceiling_property() {
        for page_size in 1..=12u64 {
            for total in 0..=50u64 {
                let meta = PaginationMeta::create(1, page_size, total);
                let expected = if total == 0 {
                    0
                } else {
                    (total + page_size - 1) / page_size
                };
                assert_eq!(meta.total_pages, expected, "{}/{}", total, page_size);
            }
        }
    }

    #[test]
    fn test_pagination_zero_page_size_does_not_panic() {
        assert_eq!(PaginationMeta::create(1, 0, 5).total_pages, 0);
    }

    #[test]
    fn test_success_envelope_serialization() {
        let body = Envelope::success("ok", json!({"status": "healthy"}));
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "ok",
                "data": {"status": "healthy"},
                "detail": null
            })
        );
    }

    #[test]
    fn test_message_only_envelope_has_null_data() {
        let body: Envelope<()> = Envelope::message_only("done");
        let value = serde_json::to_value(&body).unwrap();
        assert!(value["data"].is_null());
    }

    #[test]
    fn test_success_with_detail() {
        let body = Envelope::success_with_detail("ok", 1, json!("extra"));
        assert_eq!(body.detail, Some(json!("extra")));
    }

    #[test]
    fn test_error_response_shape() {
        let body = ErrorResponse::new(StatusCode::CONFLICT, "taken", Some(json!({"id": 1})));
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(
            value,
            json!({
                "success": false,
                "message": "taken",
                "data": null,
                "detail": {"id": 1},
                "status_code": 409
            })
        );
    }

    #[test]
    fn test_error_response_into_response_uses_status() {
        let response = ErrorResponse::new(StatusCode::FORBIDDEN, "no", None).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_paginated_response_serialization() {
        let body = PaginatedResponse::new("page", vec![1, 2, 3], PaginationMeta::create(1, 3, 9));
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["data"], json!([1, 2, 3]));
        assert_eq!(value["meta"]["total_pages"], 3);
        assert_eq!(value["success"], true);
    }

    #[test]
    fn test_timestamps_default() {
        let ts = Timestamps::default();
        assert!(ts.created_at.is_none());
        assert!(ts.updated_at.is_none());
    }
}
