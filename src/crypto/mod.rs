//! Cryptographic utilities for the consent ledger.
//!
//! Provides:
//! - Canonical JSON (RFC 8785) serialization and hashing
//! - Ed25519 bundle signing (SHA-512 digest, 128-hex-char signatures)
//! - Merkle tree construction with odd-node promotion and inclusion proofs
//! - Thin AES-256-GCM wrap for bundle payloads

mod encrypt;
mod hash;
mod merkle;
mod signing;

pub use encrypt::*;
pub use hash::*;
pub use merkle::*;
pub use signing::*;
