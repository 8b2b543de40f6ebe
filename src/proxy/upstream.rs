//! Outbound client for the fixed upstream origin.
//!
//! # Responsibilities
//! - Own the pooled HTTP(S) client shared by every request task
//! - Bound concurrent upstream connections with a semaphore
//! - Point the inbound path and query at the origin, byte for byte
//! - Enforce the outbound deadline
//!
//! # Design Decisions
//! - Exactly one attempt per request; failures are reported, never retried
//! - Redirects are relayed to the caller rather than followed
//! - The path is never normalized: `/a/../b` reaches the upstream as sent
//! - Dropping the returned future aborts the outbound call

use std::sync::Arc;
use std::time::Duration;

use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderMap, Method, Request, Response, Uri};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::UpstreamConfig;
use crate::observability::metrics;
use crate::proxy::error::{BuildError, ProxyError};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// The single upstream service behind the proxy.
#[derive(Clone)]
pub struct Upstream {
    client: HttpsClient,
    scheme: Scheme,
    authority: Authority,
    timeout: Duration,
    slots: Arc<Semaphore>,
}

/// An upstream response head, the slot it occupies, and the time by which
/// its body must be fully read.
pub struct Forwarded {
    pub response: Response<Incoming>,
    pub slot: UpstreamSlot,
    pub deadline: Instant,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, BuildError> {
        let origin: Uri = config
            .origin
            .parse()
            .map_err(|e| BuildError::Origin(format!("{}: {}", config.origin, e)))?;
        let (scheme, authority) = match (origin.scheme(), origin.authority()) {
            (Some(scheme), Some(authority)) => (scheme.clone(), authority.clone()),
            _ => {
                return Err(BuildError::Origin(format!(
                    "{}: missing scheme or host",
                    config.origin
                )))
            }
        };

        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(Duration::from_secs(config.connect_timeout_secs)));
        http.set_keepalive(Some(Duration::from_secs(config.keepalive_secs)));

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_timer(TokioTimer::new())
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build(https);

        tracing::info!(
            origin = %config.origin,
            timeout_secs = config.timeout_secs,
            max_connections = config.max_connections,
            "Upstream client ready"
        );

        Ok(Self {
            client,
            scheme,
            authority,
            timeout: config.timeout(),
            slots: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Origin + inbound path, plus `?query` when the inbound query is non-empty.
    pub fn target_uri(&self, inbound: &Uri) -> Result<Uri, ProxyError> {
        let path_and_query = match inbound.query().filter(|q| !q.is_empty()) {
            Some(query) => format!("{}?{}", inbound.path(), query),
            None => inbound.path().to_string(),
        };
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ProxyError::RequestBuild(format!("{}: {}", inbound, e)))
    }

    /// Send one request upstream.
    ///
    /// Waiting for a connection slot and receiving the response head share a
    /// single deadline, which is handed back for the body.
    pub async fn send(
        &self,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Forwarded, ProxyError> {
        let deadline = Instant::now() + self.timeout;

        let permit = tokio::time::timeout_at(deadline, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| {
                ProxyError::UpstreamUnreachable("timed out waiting for a connection slot".into())
            })?
            .map_err(|_| ProxyError::UpstreamUnreachable("connection pool closed".into()))?;
        let slot = UpstreamSlot::new(permit);

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body))
            .map_err(|e| ProxyError::RequestBuild(e.to_string()))?;
        *request.headers_mut() = headers;

        let response = tokio::time::timeout_at(deadline, self.client.request(request))
            .await
            .map_err(|_| ProxyError::UpstreamUnreachable("timed out".into()))?
            .map_err(|e| ProxyError::UpstreamUnreachable(describe(&e)))?;

        Ok(Forwarded {
            response,
            slot,
            deadline,
        })
    }

    /// Connection slots not currently in use.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

fn describe(error: &hyper_util::client::legacy::Error) -> String {
    let kind = if error.is_connect() { "connect" } else { "transport" };
    match std::error::Error::source(error) {
        Some(cause) => format!("{}: {}", kind, cause),
        None => format!("{}: {}", kind, error),
    }
}

/// Holds an upstream connection slot until the response is fully relayed.
#[derive(Debug)]
pub struct UpstreamSlot {
    _permit: OwnedSemaphorePermit,
}

impl UpstreamSlot {
    fn new(permit: OwnedSemaphorePermit) -> Self {
        metrics::upstream_in_flight(1.0);
        Self { _permit: permit }
    }
}

impl Drop for UpstreamSlot {
    fn drop(&mut self) {
        metrics::upstream_in_flight(-1.0);
    }
}
