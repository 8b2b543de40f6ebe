//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper HTTP/1.1 per connection, timeouts, Axum router)
//!     → request.rs (request ID)
//!     → proxy::ForwardPipeline (verify, forward, relay)
//!     → response.rs (failure → status + fixed body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{assign_request_id, request_id, GeneratedRequestId, X_REQUEST_ID};
pub use server::{HttpServer, ServerError};
