//! Hashing for the ledger
//!
//! This module provides:
//! - SHA-256 hashing of raw bytes
//! - Canonical JSON encoding plus digest for hashed payloads

use crate::Result;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hash arbitrary bytes using SHA-256
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(hash_bytes(data.as_ref()))
}

/// Encode a payload as compact JSON and digest exactly that text
///
/// Returns the encoded text alongside its hex digest.
pub fn digest_payload<T: Serialize>(payload: &T) -> Result<(String, String)> {
    let json = serde_json::to_string(payload)?;
    let hash = sha256_hex(json.as_bytes());
    Ok((json, hash))
}
