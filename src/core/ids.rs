// src/core/ids.rs

//! Generation of fabric-wide identifiers.
//!
//! Minion and command identifiers share one scheme: 8 bytes from the OS
//! cryptographic random source, hex-encoded to 16 characters. The result
//! store's `(command_id, minion_id)` idempotency relies on these not
//! colliding in practice.

use crate::core::HiveLinkError;

/// The number of random bytes backing one identifier.
const ID_BYTES: usize = 8;

/// Generates a fresh 16-hex identifier.
pub fn generate() -> Result<String, HiveLinkError> {
    let mut buf = [0u8; ID_BYTES];
    getrandom::fill(&mut buf)
        .map_err(|e| HiveLinkError::Internal(format!("random source unavailable: {e}")))?;
    Ok(hex::encode(buf))
}

/// Checks whether `id` has the shape produced by [`generate`].
pub fn is_well_formed(id: &str) -> bool {
    id.len() == ID_BYTES * 2 && id.chars().all(|c| c.is_ascii_hexdigit())
}
