//! RSA PKCS#1 v1.5 signature verification over SHA-256.
//!
//! The signature travels base64-encoded (standard alphabet, padded). Callers
//! get two error variants so logs can tell them apart, but the boundary maps
//! both to the same response.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid base64 signature: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("signature verification failed: {0}")]
    Invalid(#[from] rsa::Error),
}

/// Checks that `signature` is a valid signature of `signed_value`.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        key: &RsaPublicKey,
        signed_value: &str,
        signature: &str,
    ) -> Result<(), SignatureError>;
}

/// Production verifier backed by [`verify_signature`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RsaSignatureVerifier;

impl SignatureVerifier for RsaSignatureVerifier {
    fn verify(
        &self,
        key: &RsaPublicKey,
        signed_value: &str,
        signature: &str,
    ) -> Result<(), SignatureError> {
        verify_signature(key, signed_value, signature)
    }
}

/// Verify a base64 PKCS#1 v1.5 signature of the SHA-256 digest of `signed_value`.
pub fn verify_signature(
    key: &RsaPublicKey,
    signed_value: &str,
    signature: &str,
) -> Result<(), SignatureError> {
    let signature = STANDARD.decode(signature)?;
    let digest = Sha256::digest(signed_value.as_bytes());

    key.verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)?;
    Ok(())
}
