//! Push-event signature verification
//!
//! WeChat signs every callback with `SHA1(sort(token, message, timestamp, nonce))`.

use sha1::{Digest, Sha1};

use crate::utils::constant_time_eq;

/// Compute the signature WeChat attaches to a pushed message.
pub fn compute_push_signature(token: &str, message: &str, timestamp: &str, nonce: &str) -> String {
    let mut parts = [token, message, timestamp, nonce];
    parts.sort_unstable();
    hex::encode(Sha1::digest(parts.concat().as_bytes()))
}

/// Check a pushed message against its `msg_signature`.
pub fn verify_push_signature(
    token: &str,
    signature: &str,
    message: &str,
    timestamp: &str,
    nonce: &str,
) -> bool {
    let expected = compute_push_signature(token, message, timestamp, nonce);
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}
