//! Request verification and forwarding.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → pipeline.rs (fixed step order, one failure exit per step)
//!         → security::provider (current key)
//!         → sanitize.rs (split sec/secval from the JSON body)
//!         → security::signature (verify secval against sec)
//!         → upstream.rs (pooled outbound call, single attempt)
//!     → relay.rs (status + headers verbatim, streamed body)
//! ```

pub mod error;
pub mod pipeline;
pub mod relay;
pub mod sanitize;
pub mod upstream;

pub use error::{BuildError, ProxyError};
pub use pipeline::ForwardPipeline;
pub use sanitize::{sanitize, SanitizeError, SanitizedPayload};
pub use upstream::Upstream;
