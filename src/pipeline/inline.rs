//! Inline (base64) payload decoding.
//!
//! Inline files come from sandboxed tools that cannot hand out a download
//! link. Their ceiling is smaller than the download ceiling and is checked
//! against the encoded length first, so an oversized payload is rejected
//! without allocating its decoded form.

use crate::error::BridgeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::debug;

/// Upper bound of the decoded size of a standard base64 string.
fn decoded_upper_bound(encoded: &str) -> u64 {
    (encoded.len() as u64).div_ceil(4) * 3
}

/// Decode an inline payload, enforcing `limit` on the decoded size.
pub fn decode_inline(name: &str, data_base64: &str, limit: u64) -> Result<Bytes, BridgeError> {
    let encoded: String = data_base64.split_ascii_whitespace().collect();
    if encoded.is_empty() {
        return Err(BridgeError::EmptyPayload {
            name: name.to_string(),
        });
    }

    // Padding means the bound can overshoot by at most two bytes.
    let bound = decoded_upper_bound(&encoded);
    if bound > limit.saturating_add(2) {
        return Err(BridgeError::InlineTooLarge { size: bound, limit });
    }

    let raw = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| BridgeError::InvalidBase64 {
            name: name.to_string(),
        })?;

    let size = raw.len() as u64;
    if size == 0 {
        return Err(BridgeError::EmptyPayload {
            name: name.to_string(),
        });
    }
    if size > limit {
        return Err(BridgeError::InlineTooLarge { size, limit });
    }

    debug!("Decoded inline file '{}' ({} bytes)", name, size);
    Ok(Bytes::from(raw))
}
