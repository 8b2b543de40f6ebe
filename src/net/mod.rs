//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (lifecycle tracking, activity for idle timeout)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Plain TCP only; TLS termination happens in front of the proxy

pub mod connection;
pub mod listener;

pub use connection::{ActivityIo, ConnectionActivity, ConnectionTracker};
pub use listener::{Accepted, ConnectionPermit, Listener, ListenerError};
