//! Request identification.
//!
//! Every inbound request carries an `x-request-id` for the rest of its life in
//! the proxy. A client-supplied id is kept and, being an `x-` header, travels
//! upstream with the other custom headers. When the client sent none, a UUID
//! v4 is assigned for logs and spans only; the request is tagged with
//! [`GeneratedRequestId`] so the pipeline can keep it off the outbound call.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Marks a request whose `x-request-id` was assigned by the proxy.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedRequestId;

/// Middleware that fills in a missing `x-request-id`.
pub async fn assign_request_id(mut request: Request, next: Next) -> Response {
    if !request.headers().contains_key(X_REQUEST_ID) {
        let id = Uuid::new_v4().to_string();
        if let Ok(value) = HeaderValue::from_str(&id) {
            request.headers_mut().insert(X_REQUEST_ID, value);
            request.extensions_mut().insert(GeneratedRequestId);
        }
    }
    next.run(request).await
}

/// The request id carried in `headers`, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}
