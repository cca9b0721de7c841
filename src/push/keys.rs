//! Application server key decoding
//!
//! Push servers publish their key as URL-safe base64; the platform registrar
//! wants raw bytes. Keys arrive with or without padding depending on who
//! encoded them, and some servers hand out the standard alphabet, so both
//! are accepted.

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine as _;

use crate::types::{CanopyError, Result};

/// Decode a URL-safe base64 application server key into raw bytes
pub fn decode_server_key(raw: &str) -> Result<Vec<u8>> {
    let trimmed = raw.trim().trim_end_matches('=');
    if trimmed.is_empty() {
        return Err(CanopyError::Subscription(
            "application server key is empty".into(),
        ));
    }

    let normalized: String = trimmed
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    STANDARD_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| CanopyError::Subscription(format!("invalid application server key: {}", e)))
}
