//! Errors raised while handling a proxied request.
//!
//! Each variant is terminal for its request. The mapping to a status code and
//! client-facing message lives in `http::response`.

use thiserror::Error;

use crate::proxy::sanitize::SanitizeError;
use crate::security::{KeyError, SignatureError};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("verification key unavailable: {0}")]
    Key(#[from] KeyError),

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error("failed to build upstream request: {0}")]
    RequestBuild(String),

    #[error("upstream unreachable: {0}")]
    UpstreamUnreachable(String),
}

impl ProxyError {
    /// Short label for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProxyError::Key(_) => "key_error",
            ProxyError::BodyRead(_) => "body_read_error",
            ProxyError::PayloadTooLarge { .. } => "payload_too_large",
            ProxyError::Sanitize(SanitizeError::BodyParse(_)) => "body_parse_error",
            ProxyError::Sanitize(SanitizeError::FieldType(_)) => "field_type_error",
            ProxyError::Sanitize(SanitizeError::EmptyCredentials) => "empty_credentials",
            ProxyError::Sanitize(SanitizeError::Encode(_)) => "encode_error",
            ProxyError::Signature(_) => "signature_rejected",
            ProxyError::RequestBuild(_) => "request_build_error",
            ProxyError::UpstreamUnreachable(_) => "upstream_unreachable",
        }
    }
}

/// Failure to assemble the pipeline at startup.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid upstream origin {0}")]
    Origin(String),

    #[error("failed to watch key file: {0}")]
    KeyWatch(#[from] notify::Error),
}
