//! Deterministic hashing.
//!
//! Two hash functions with two distinct jobs, never conflated:
//! - SHA-512 digests the canonical signing bytes of a proof bundle
//!   (the value Ed25519 signs).
//! - SHA-256 builds Merkle trees and derived identifiers.
//!
//! Canonical JSON uses `serde_json_canonicalizer` for strict RFC 8785
//! compliance: lexicographic UTF-8 key ordering, ES6 number
//! serialization, no extra whitespace. The same logical value always
//! produces the same bytes regardless of insertion order.

use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

/// 32-byte SHA-256 hash
pub type Hash256 = [u8; 32];

/// 64-byte SHA-512 hash
pub type Hash512 = [u8; 64];

/// Domain prefix for time-lock puzzle derivation
pub const DOMAIN_TIME_LOCK: &[u8] = b"CONSENT_TIMELOCK_V1";

/// Error canonicalizing a JSON value (NaN/Infinity are not valid JSON).
#[derive(Debug, thiserror::Error)]
#[error("canonicalization failed: {0}")]
pub struct CanonicalizeError(String);

/// Encode a u32 as 4 bytes big-endian
#[inline]
pub fn u32_be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Encode a u64 as 8 bytes big-endian
#[inline]
pub fn u64_be(n: u64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Convert a JSON value to its canonical string form per RFC 8785.
pub fn canonicalize_json(value: &serde_json::Value) -> Result<String, CanonicalizeError> {
    serde_json_canonicalizer::to_string(value).map_err(|e| CanonicalizeError(e.to_string()))
}

/// Hash raw bytes with SHA-256
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash raw bytes with SHA-512
pub fn sha512(data: &[u8]) -> Hash512 {
    let mut hasher = Sha512::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Combine two SHA-256 hashes into a parent node hash
pub fn hash_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Derive the time-lock puzzle hash for a bundle.
///
/// ```text
/// puzzle = SHA256(b"CONSENT_TIMELOCK_V1" || UUID(bundle_id) ||
///                 I64_BE(unlock_at_millis) || U32_BE(difficulty))
/// ```
pub fn compute_time_lock_puzzle(
    bundle_id: &Uuid,
    unlock_at_millis: i64,
    difficulty: u32,
) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_TIME_LOCK);
    hasher.update(bundle_id.as_bytes());
    hasher.update(unlock_at_millis.to_be_bytes());
    hasher.update(u32_be(difficulty));
    hasher.finalize().into()
}
