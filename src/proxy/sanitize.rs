//! Payload sanitization.
//!
//! The inbound body is an arbitrary JSON object. Two reserved string fields
//! carry the signature (`sec`) and the signed value (`secval`); they are pulled
//! out and everything else is forwarded.

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

pub const SIGNATURE_FIELD: &str = "sec";
pub const SIGNED_VALUE_FIELD: &str = "secval";

/// Body with the reserved fields removed, plus the fields themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPayload {
    /// Re-serialized object without `sec`/`secval`.
    pub body: Bytes,
    /// Base64 signature.
    pub sec: String,
    /// The value the signature covers.
    pub secval: String,
}

#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("body is not a JSON object: {0}")]
    BodyParse(String),

    #[error("field '{0}' is missing or not a string")]
    FieldType(&'static str),

    /// Both fields are strings but at least one is empty.
    #[error("empty signature credentials")]
    EmptyCredentials,

    #[error("failed to re-encode body: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Split `raw` into the forwardable body and the signature fields.
pub fn sanitize(raw: &[u8]) -> Result<SanitizedPayload, SanitizeError> {
    let mut object = match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(SanitizeError::BodyParse(format!(
                "expected an object, found {}",
                json_kind(&other)
            )))
        }
        Err(e) => return Err(SanitizeError::BodyParse(e.to_string())),
    };

    let sec = string_field(&object, SIGNATURE_FIELD)?;
    let secval = string_field(&object, SIGNED_VALUE_FIELD)?;
    if sec.is_empty() || secval.is_empty() {
        return Err(SanitizeError::EmptyCredentials);
    }

    object.remove(SIGNATURE_FIELD);
    object.remove(SIGNED_VALUE_FIELD);
    let body = serde_json::to_vec(&object)?;

    Ok(SanitizedPayload {
        body: Bytes::from(body),
        sec,
        secval,
    })
}

fn string_field(object: &Map<String, Value>, name: &'static str) -> Result<String, SanitizeError> {
    object
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(SanitizeError::FieldType(name))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
