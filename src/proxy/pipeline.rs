//! The verification-and-forwarding pipeline.
//!
//! ```text
//! Received ─key─▶ KeyLoaded ─body─▶ Sanitized ─verify─▶ Verified ─send─▶ Forwarded ─stream─▶ Relayed
//!     │               │                  │                  │                 │
//!     ▼               ▼                  ▼                  ▼                 ▼
//!  500 key       400/404/413/500        401                502        aborted stream
//! ```
//!
//! Every step runs strictly in order and every failure ends the request. The
//! upstream is contacted only after the signature has been verified, and at
//! most once.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::LengthLimitError;
use tokio::time::Instant;

use crate::config::ProxyConfig;
use crate::http::request::{GeneratedRequestId, X_REQUEST_ID};
use crate::proxy::error::{BuildError, ProxyError};
use crate::proxy::relay::relay_response;
use crate::proxy::sanitize::sanitize;
use crate::proxy::upstream::Upstream;
use crate::security::{
    forwardable_headers, key_provider_from_config, KeyProvider, RsaSignatureVerifier,
    SignatureVerifier,
};

/// Verifies signed requests and forwards them to the upstream.
pub struct ForwardPipeline {
    keys: Arc<dyn KeyProvider>,
    verifier: Arc<dyn SignatureVerifier>,
    upstream: Upstream,
    max_body_size: usize,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl ForwardPipeline {
    /// Pipeline with the key source from `config.key` and RSA verification.
    pub fn new(config: &ProxyConfig) -> Result<Self, BuildError> {
        let keys = key_provider_from_config(&config.key)?;
        Self::with_collaborators(config, keys, Arc::new(RsaSignatureVerifier))
    }

    /// Pipeline with explicit key and verification collaborators.
    pub fn with_collaborators(
        config: &ProxyConfig,
        keys: Arc<dyn KeyProvider>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            keys,
            verifier,
            upstream: Upstream::new(&config.upstream)?,
            max_body_size: config.security.max_body_size,
            read_timeout: config.timeouts.read(),
            write_timeout: config.timeouts.write(),
        })
    }

    /// Run one request through the pipeline.
    pub async fn handle(&self, request: Request<Body>) -> Result<Response<Body>, ProxyError> {
        let deadline = Instant::now() + self.write_timeout;

        let key = self.keys.current_key()?;

        let (parts, body) = request.into_parts();
        let raw = self.read_body(body).await?;
        let payload = sanitize(&raw)?;

        self.verifier.verify(&key, &payload.secval, &payload.sec)?;

        let target = self.upstream.target_uri(&parts.uri)?;
        let mut headers = forwardable_headers(&parts.headers);
        if parts.extensions.get::<GeneratedRequestId>().is_some() {
            headers.remove(X_REQUEST_ID);
        }
        tracing::debug!(
            method = %parts.method,
            target = %target,
            forwarded_headers = headers.len(),
            "Signature verified, forwarding"
        );

        let forwarded = self
            .upstream
            .send(parts.method, target, headers, payload.body)
            .await?;
        tracing::debug!(status = %forwarded.response.status(), "Upstream responded");

        Ok(relay_response(
            forwarded.response,
            forwarded.slot,
            forwarded.deadline.min(deadline),
        ))
    }

    async fn read_body(&self, body: Body) -> Result<bytes::Bytes, ProxyError> {
        match tokio::time::timeout(self.read_timeout, axum::body::to_bytes(body, self.max_body_size)).await {
            Err(_) => Err(ProxyError::BodyRead("read timed out".into())),
            Ok(Err(e)) if exceeds_limit(&e) => Err(ProxyError::PayloadTooLarge {
                limit: self.max_body_size,
            }),
            Ok(Err(e)) => Err(ProxyError::BodyRead(e.to_string())),
            Ok(Ok(raw)) => Ok(raw),
        }
    }
}

fn exceeds_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}
