//! Streaming the upstream response back to the caller.
//!
//! Status and headers are copied verbatim before the first body byte. The
//! body is passed through chunk by chunk. Once the status line is committed a
//! failure can only be reported by aborting the stream, which hyper turns into
//! a reset connection.

use std::pin::Pin;

use axum::body::Body;
use axum::http::Response;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use thiserror::Error;
use tokio::time::Instant;

use crate::proxy::upstream::UpstreamSlot;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("upstream body stream failed: {0}")]
    Stream(#[source] BoxError),

    #[error("response write deadline exceeded")]
    Deadline,
}

/// Turn an upstream response into the caller's response.
pub fn relay_response(
    response: Response<Incoming>,
    slot: UpstreamSlot,
    deadline: Instant,
) -> Response<Body> {
    let (parts, body) = response.into_parts();
    let stream = relay_stream(body.into_data_stream(), slot, deadline);
    Response::from_parts(parts, Body::from_stream(stream))
}

/// Pass `upstream` through until it ends, fails, or `deadline` passes.
///
/// `guard` lives exactly as long as the stream does.
pub fn relay_stream<S, E, G>(
    upstream: S,
    guard: G,
    deadline: Instant,
) -> impl Stream<Item = Result<Bytes, RelayError>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<BoxError> + Send + 'static,
    G: Send + 'static,
{
    let upstream: Pin<Box<S>> = Box::pin(upstream);
    futures_util::stream::unfold(Some((upstream, guard)), move |state| async move {
        let (mut upstream, guard) = state?;
        match tokio::time::timeout_at(deadline, upstream.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some((upstream, guard)))),
            Ok(Some(Err(e))) => {
                let error = RelayError::Stream(e.into());
                tracing::error!(error = %error, "Response body copy error");
                Some((Err(error), None))
            }
            Ok(None) => None,
            Err(_) => {
                tracing::error!("Response body copy error: write deadline exceeded");
                Some((Err(RelayError::Deadline), None))
            }
        }
    })
}
