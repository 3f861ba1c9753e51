//! CORS policy built from settings.

use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::Settings;

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v.trim() == "*")
}

/// Build the CORS layer for the configured origins, methods and headers.
///
/// A `*` entry means "any". Browsers reject a literal `*` on credentialed
/// requests, so when credentials are allowed a wildcard mirrors the
/// request's own origin, method or headers instead.
pub fn cors_layer(settings: &Settings) -> CorsLayer {
    let credentials = settings.cors_credentials;

    let origins = if is_wildcard(&settings.cors_origins) {
        if credentials {
            AllowOrigin::mirror_request()
        } else {
            Any.into()
        }
    } else {
        let parsed: Vec<HeaderValue> = settings
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    let methods = if is_wildcard(&settings.cors_methods) {
        if credentials {
            AllowMethods::mirror_request()
        } else {
            Any.into()
        }
    } else {
        let parsed: Vec<Method> = settings
            .cors_methods
            .iter()
            .filter_map(|method| {
                match Method::from_bytes(method.trim().to_uppercase().as_bytes()) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(method = %method, "ignoring invalid CORS method");
                        None
                    }
                }
            })
            .collect();
        AllowMethods::list(parsed)
    };

    let headers = if is_wildcard(&settings.cors_headers) {
        if credentials {
            AllowHeaders::mirror_request()
        } else {
            Any.into()
        }
    } else {
        let parsed: Vec<HeaderName> = settings
            .cors_headers
            .iter()
            .filter_map(|name| match HeaderName::from_bytes(name.trim().as_bytes()) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(header = %name, "ignoring invalid CORS header");
                    None
                }
            })
            .collect();
        AllowHeaders::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .allow_credentials(credentials)
}
