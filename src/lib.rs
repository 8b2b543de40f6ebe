//! Signature-gated reverse proxy library.
//!
//! Every inbound request carries a JSON body with a base64 RSA signature in
//! `sec` over the string in `secval`. Verified requests have both fields
//! stripped and are forwarded to a single fixed upstream; the upstream
//! response is streamed back unchanged.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::ForwardPipeline;
