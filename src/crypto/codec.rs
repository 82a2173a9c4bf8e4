//! Wager vector encoding.
//!
//! Wagers travel inside ciphertexts as compact JSON arrays (`[0,1,2,0,1]`).
//! The encoding is delimiter based and round-trips exactly for every
//! non-empty vector of values in `0..=255`.

use crate::error::{AppError, AppResult};
use crate::models::WagerVector;

/// Encode a wager, refusing anything that would not fit in `max_len` bytes
pub fn encode_wager(wager: &[u8], max_len: usize) -> AppResult<Vec<u8>> {
    if wager.is_empty() {
        return Err(AppError::Validation("Wager vector must not be empty".into()));
    }

    let bytes = serde_json::to_vec(wager)?;
    if bytes.len() > max_len {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_len,
        });
    }

    Ok(bytes)
}

/// Decode a plaintext produced by [`encode_wager`]
pub fn decode_wager(bytes: &[u8]) -> AppResult<WagerVector> {
    let wager: WagerVector = serde_json::from_slice(bytes)
        .map_err(|e| AppError::Decryption(format!("Malformed wager payload: {}", e)))?;

    if wager.is_empty() {
        return Err(AppError::Decryption("Decoded wager vector is empty".into()));
    }

    Ok(wager)
}
