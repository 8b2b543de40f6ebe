//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router that sends every method and path to the pipeline
//! - Wire up middleware (request ID, tracing, write timeout)
//! - Run the accept loop over the bounded listener
//! - Serve each connection with read, write and idle timeouts
//! - Drain connections on shutdown

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ProxyConfig, TimeoutConfig};
use crate::http::request::{assign_request_id, request_id};
use crate::lifecycle::Shutdown;
use crate::net::connection::{ActivityIo, ConnectionActivity, ConnectionGuard, ConnectionTracker};
use crate::net::listener::{Accepted, ConnectionPermit, Listener, ListenerError};
use crate::observability::metrics;
use crate::proxy::{BuildError, ForwardPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ForwardPipeline>,
}

/// Errors that stop the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP front of the signature proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server whose pipeline is built from `config`.
    pub fn new(config: ProxyConfig) -> Result<Self, BuildError> {
        let pipeline = ForwardPipeline::new(&config)?;
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create a server around an existing pipeline.
    pub fn with_pipeline(config: ProxyConfig, pipeline: ForwardPipeline) -> Self {
        let state = AppState {
            pipeline: Arc::new(pipeline),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(config.timeouts.write()))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id(request.headers()),
                )
            }))
            .layer(middleware::from_fn(assign_request_id))
    }

    /// The fully layered router, for driving the proxy without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Accept and serve connections until `shutdown` is triggered or the
    /// listener fails.
    pub async fn run(
        self,
        listener: Listener,
        shutdown: Shutdown,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.origin,
            "Proxy server running"
        );

        let tracker = ConnectionTracker::new();
        let mut stop = shutdown.subscribe();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let Accepted { stream, peer, permit } = match accepted {
                        Ok(conn) => conn,
                        Err(e) if e.is_transient() => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Listener failed");
                            return Err(e.into());
                        }
                    };

                    let connection = Connection {
                        stream,
                        peer,
                        router: self.router.clone(),
                        timeouts: self.config.timeouts.clone(),
                        shutdown: shutdown.subscribe(),
                        guard: tracker.track(),
                        _permit: permit,
                    };
                    tokio::spawn(connection.serve());
                }
                _ = stop.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let drain_deadline = self.config.timeouts.write();
        if tokio::time::timeout(drain_deadline, tracker.wait_for_drain()).await.is_err() {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Connections still open after drain deadline"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// One accepted connection and everything it holds until it closes.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    timeouts: TimeoutConfig,
    shutdown: broadcast::Receiver<()>,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl Connection {
    async fn serve(mut self) {
        let connection_id = self.guard.id();
        let peer = self.peer;
        let activity = ConnectionActivity::new();
        let io = TokioIo::new(ActivityIo::new(self.stream, activity.clone()));

        let service = {
            let router = self.router.clone();
            let activity = activity.clone();
            service_fn(move |mut request: Request<Incoming>| {
                let router = router.clone();
                let busy = activity.begin_request();
                request.extensions_mut().insert(ConnectInfo(peer));
                async move {
                    let _busy = busy;
                    router.oneshot(request.map(Body::new)).await
                }
            })
        };

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.timeouts.read())
            .keep_alive(true);
        let conn = builder.serve_connection(io, service);
        tokio::pin!(conn);

        let idle_timeout = self.timeouts.idle();
        let mut idle_check = tokio::time::interval(idle_check_period(idle_timeout));
        let mut closing = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(connection_id = %connection_id, peer = %peer, error = %e, "Connection error");
                    }
                    break;
                }
                _ = self.shutdown.recv(), if !closing => {
                    conn.as_mut().graceful_shutdown();
                    closing = true;
                }
                _ = idle_check.tick(), if !closing => {
                    if activity.is_idle(idle_timeout) {
                        tracing::debug!(connection_id = %connection_id, peer = %peer, "Closing idle connection");
                        conn.as_mut().graceful_shutdown();
                        closing = true;
                    }
                }
            }
        }
    }
}

fn idle_check_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).clamp(Duration::from_millis(50), Duration::from_secs(1))
}

/// Main proxy handler: every method and path goes through the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let id = request_id(request.headers()).to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    tracing::debug!(request_id = %id, peer = %peer, "Proxying request");

    match state.pipeline.handle(request).await {
        Ok(response) => {
            metrics::record_request(method.as_str(), response.status().as_u16(), "forwarded", start);
            response
        }
        Err(e) => {
            e.log(&id);
            metrics::record_request(method.as_str(), e.status().as_u16(), e.outcome(), start);
            e.into_response()
        }
    }
}
