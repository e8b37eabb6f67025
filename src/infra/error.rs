//! Error types for the consent ledger infrastructure.

use thiserror::Error;

use crate::crypto::{CanonicalizeError, EncryptionError, MerkleError, SigningError};

/// Errors that can occur across the ledger core.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Event batch not contiguous or not sorted for its aggregate.
    /// Indicates a caller bug; the caller must recompute and retry.
    #[error("sequence error for aggregate {aggregate_id}: {message}")]
    Sequence {
        aggregate_id: String,
        message: String,
    },

    /// A concurrent writer took the version first. The caller must
    /// reload the aggregate and retry the command.
    #[error(
        "concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    /// Proof generation attempted without a configured signing key
    #[error("no bundle signing key configured (set PROOF_SIGNING_KEY)")]
    SigningKeyMissing,

    /// Signing/verification plumbing error
    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    /// Ledger oracle unreachable or returned a non-success status
    #[error("ledger anchor unavailable: {0}")]
    AnchorUnavailable(String),

    /// Aggregation requested over zero bundles
    #[error("merkle aggregation requires at least one bundle")]
    EmptyMerkleInput,

    /// Encryption error
    #[error("encryption error: {0}")]
    Encryption(#[from] EncryptionError),

    /// Canonical serialization error
    #[error("canonicalization error: {0}")]
    Canonical(#[from] CanonicalizeError),

    /// Domain invariant violated by a command
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Payload or state decode error
    #[error("codec error: {0}")]
    Codec(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MerkleError> for LedgerError {
    fn from(err: MerkleError) -> Self {
        match err {
            MerkleError::EmptyInput => LedgerError::EmptyMerkleInput,
        }
    }
}

impl LedgerError {
    /// Whether the caller should reload the aggregate and retry.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }
}

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;
