//! Verification key loading.
//!
//! The first PEM block in a key file must be labelled `PUBLIC KEY` or
//! `RSA PUBLIC KEY` and carry a PKIX SubjectPublicKeyInfo for an RSA key of
//! at most [`MAX_KEY_BITS`] bits. Loading is a pure function of the file contents and is safe to call
//! from any number of requests at once.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1::RsaPublicKey as RsaPublicKeyParams;
use rsa::pkcs8::der::Decode;
use rsa::pkcs8::spki::SubjectPublicKeyInfoRef;
use rsa::{BigUint, RsaPublicKey};
use thiserror::Error;

const ACCEPTED_LABELS: [&str; 2] = ["PUBLIC KEY", "RSA PUBLIC KEY"];

/// Largest modulus accepted, in bits.
pub const MAX_KEY_BITS: usize = 16384;

/// Why a verification key could not be produced.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read public key file: {0}")]
    Read(#[from] std::io::Error),

    /// Missing or mislabelled PEM block, or degenerate key parameters.
    #[error("invalid public key format: {0}")]
    Format(String),

    /// The block payload is not a well-formed public key structure.
    #[error("failed to parse public key: {0}")]
    Parse(String),

    #[error("key is not an RSA public key")]
    Type,
}

/// Read and parse the public key stored at `path`.
pub fn load_public_key(path: &Path) -> Result<RsaPublicKey, KeyError> {
    let raw = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&raw);
    parse_public_key_pem(&text)
}

/// Parse a PEM-encoded RSA public key.
///
/// Only the first decodable PEM block counts. Text around it is ignored and
/// the base64 body may be wrapped at any width, or not at all.
pub fn parse_public_key_pem(text: &str) -> Result<RsaPublicKey, KeyError> {
    let (label, der) = first_pem_block(text)
        .ok_or_else(|| KeyError::Format("no PEM block found".to_string()))?;

    if !ACCEPTED_LABELS.contains(&label) {
        return Err(KeyError::Format(format!("unexpected PEM block type: {}", label)));
    }

    let spki = SubjectPublicKeyInfoRef::from_der(&der)
        .map_err(|e| KeyError::Parse(e.to_string()))?;
    if spki.algorithm.oid != rsa::pkcs1::ALGORITHM_OID {
        return Err(KeyError::Type);
    }

    let bits = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| KeyError::Parse("subject public key is not octet aligned".to_string()))?;
    let params = RsaPublicKeyParams::from_der(bits).map_err(|e| KeyError::Parse(e.to_string()))?;

    let n = BigUint::from_bytes_be(params.modulus.as_bytes());
    let e = BigUint::from_bytes_be(params.public_exponent.as_bytes());
    let zero = BigUint::from(0u8);
    if n == zero || e == zero {
        return Err(KeyError::Format("invalid RSA public key".to_string()));
    }

    RsaPublicKey::new_with_max_size(n, e, MAX_KEY_BITS).map_err(|e| KeyError::Parse(e.to_string()))
}

/// Label and payload of the first `-----BEGIN ...-----` block whose body is
/// valid base64. Header lines (`Name: value`) inside a block are skipped.
fn first_pem_block(text: &str) -> Option<(&str, Vec<u8>)> {
    const BEGIN: &str = "-----BEGIN ";
    const DASHES: &str = "-----";

    let mut rest = text;
    while let Some(start) = rest.find(BEGIN) {
        let after_begin = &rest[start + BEGIN.len()..];
        let label_end = after_begin.find(DASHES)?;
        let label = &after_begin[..label_end];
        let block = &after_begin[label_end + DASHES.len()..];
        rest = block;

        let end_marker = format!("-----END {}-----", label);
        let Some(end) = block.find(&end_marker) else {
            continue;
        };
        let encoded: String = block[..end]
            .lines()
            .filter(|line| !line.contains(':'))
            .flat_map(str::chars)
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if let Ok(der) = STANDARD.decode(encoded) {
            return Some((label, der));
        }
    }
    None
}
