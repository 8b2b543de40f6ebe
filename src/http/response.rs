//! Mapping pipeline failures to client responses.
//!
//! # Design Decisions
//! - Bodies are fixed strings; causes, paths and key details are only logged
//! - Every signature failure gets the same 401 body
//! - Empty `sec`/`secval` answers 404 with an empty body, unlike the 400 for
//!   missing or non-string fields

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::proxy::{ProxyError, SanitizeError};

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Key(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::BodyRead(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Sanitize(SanitizeError::BodyParse(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Sanitize(SanitizeError::FieldType(_)) => StatusCode::BAD_REQUEST,
            ProxyError::Sanitize(SanitizeError::EmptyCredentials) => StatusCode::NOT_FOUND,
            ProxyError::Sanitize(SanitizeError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Signature(_) => StatusCode::UNAUTHORIZED,
            ProxyError::RequestBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamUnreachable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Body sent to the client.
    pub fn public_message(&self) -> &'static str {
        match self {
            ProxyError::Key(_) => "Public key error",
            ProxyError::BodyRead(_) => "Error reading request body",
            ProxyError::PayloadTooLarge { .. } => "Request body too large",
            ProxyError::Sanitize(SanitizeError::BodyParse(_)) => "Invalid JSON",
            ProxyError::Sanitize(SanitizeError::FieldType(_)) => "sec and secval must be strings",
            ProxyError::Sanitize(SanitizeError::EmptyCredentials) => "",
            ProxyError::Sanitize(SanitizeError::Encode(_)) => "Error generating modified body",
            ProxyError::Signature(_) => "Signature verification failed",
            ProxyError::RequestBuild(_) => "Failed to create request",
            ProxyError::UpstreamUnreachable(_) => "Failed to reach target server",
        }
    }

    /// Log at a level matching who is at fault.
    pub fn log(&self, request_id: &str) {
        let status = self.status().as_u16();
        match self {
            ProxyError::Key(_)
            | ProxyError::RequestBuild(_)
            | ProxyError::UpstreamUnreachable(_)
            | ProxyError::Sanitize(SanitizeError::Encode(_)) => {
                tracing::error!(request_id, status, error = %self, "Request failed")
            }
            ProxyError::Signature(_) => {
                tracing::warn!(request_id, status, error = %self, "Signature rejected")
            }
            _ => tracing::info!(request_id, status, error = %self, "Request rejected"),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.public_message()).into_response()
    }
}
