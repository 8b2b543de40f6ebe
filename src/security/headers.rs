//! Request header allow-list.
//!
//! Only headers explicitly marked custom (`x-` prefix, any case) reach the
//! upstream. Cookies, authorization, host and every other standard header are
//! dropped.

use axum::http::HeaderMap;

/// Whether an inbound header may be forwarded to the upstream.
pub fn is_forwardable_header(name: &str) -> bool {
    name.len() >= 2 && name.as_bytes()[..2].eq_ignore_ascii_case(b"x-")
}

/// Copy the forwardable subset of `headers`, keeping every value of a
/// repeated header in order.
pub fn forwardable_headers(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_forwardable_header(name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}
