//! Correlation-id middleware.
//!
//! Reads `X-Correlation-ID` from the request, generating a fresh id when the
//! header is missing, empty, or not valid visible ASCII. The id is attached
//! to the request as a [`RequestContext`] extension for handlers to pass to
//! the database, and echoed back on the response under the same header.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use dblog_core::{generate_correlation_id, RequestContext};

/// Lower-case form of [`dblog_core::CORRELATION_ID_HEADER`].
pub const CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");

/// Extract a usable correlation id from the request headers.
pub fn incoming_correlation_id(req: &Request) -> Option<String> {
    req.headers()
        .get(&CORRELATION_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
}

/// Correlation-id middleware function.
pub async fn correlation_id_middleware(mut req: Request, next: Next) -> Response {
    let id = incoming_correlation_id(&req).unwrap_or_else(generate_correlation_id);

    req.extensions_mut()
        .insert(RequestContext::background().with_correlation_id(id.clone()));

    let mut response = next.run(req).await;

    match HeaderValue::from_str(&id) {
        Ok(value) => {
            response.headers_mut().insert(CORRELATION_ID, value);
        }
        Err(e) => {
            tracing::warn!(
                subsystem = "api",
                component = "middleware",
                request_id = %id,
                error = %e,
                "Correlation id is not a valid header value"
            );
        }
    }

    response
}
