//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → provider.rs (current verification key, via keys.rs)
//!     → signature.rs (PKCS#1 v1.5 / SHA-256 check of `secval`)
//!     → headers.rs (x-* allow-list for the outbound request)
//! ```
//!
//! # Design Decisions
//! - Fail closed: any key or signature problem stops the request
//! - Signature failures look identical to the client whatever the cause
//! - Key and verifier sit behind traits so the pipeline can be exercised
//!   without touching the filesystem

pub mod headers;
pub mod keys;
pub mod provider;
pub mod signature;

pub use headers::{forwardable_headers, is_forwardable_header};
pub use keys::{load_public_key, parse_public_key_pem, KeyError};
pub use provider::{key_provider_from_config, KeyProvider, ReloadingKeyProvider, WatchedKeyProvider};
pub use signature::{verify_signature, RsaSignatureVerifier, SignatureError, SignatureVerifier};
