//! Proof bundle types and optional attachments.
//!
//! A [`ProofBundle`] is a tamper-evident attestation of a subject's
//! consent state: a canonical serialization of the consent history,
//! hashed with SHA-512 and signed with Ed25519, optionally anchored
//! against the remote ledger through [`SnapshotRef`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{canonicalize_json, compute_time_lock_puzzle};
use crate::infra::Result;

use super::{ConsentRecord, TenantId};

/// Reference to a remote ledger snapshot embedded in a bundle.
///
/// Verification re-fetches the ordinal and requires an exact hash match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    /// Snapshot ordinal on the remote ledger
    pub ordinal: u64,

    /// Snapshot hash as reported by the ledger
    pub hash: String,

    /// Ledger timestamp (epoch milliseconds)
    pub timestamp: i64,
}

/// What a bundle attests to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofType {
    /// Full consent history of a subject
    ConsentHistory,
    /// Attestation scoped to data-processing purposes
    DataProcessing,
    /// Attestation that a subject's data was erased
    Erasure,
}

impl Default for ProofType {
    fn default() -> Self {
        ProofType::ConsentHistory
    }
}

/// Time-lock attachment: the bundle is unusable before `unlock_at`.
///
/// The puzzle hash is derived deterministically from the bundle id,
/// unlock time and difficulty, and stored for audit. Unlocking is purely
/// time-gated; the puzzle is never required to be solved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeLock {
    pub unlock_at: DateTime<Utc>,
    pub difficulty: u32,
    pub puzzle_hash: String,
}

impl TimeLock {
    pub fn new(bundle_id: &Uuid, unlock_at: DateTime<Utc>, difficulty: u32) -> Self {
        let puzzle =
            compute_time_lock_puzzle(bundle_id, unlock_at.timestamp_millis(), difficulty);
        Self {
            unlock_at,
            difficulty,
            puzzle_hash: hex::encode(puzzle),
        }
    }

    /// Whether the bundle is still locked at `now`.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        now < self.unlock_at
    }
}

/// Delegation attachment: advisory metadata naming who may use the
/// bundle and for what. No enforcement beyond storage and retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegate_id: String,
    pub permissions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Delegation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }
}

/// Encryption attachment: symmetric key + nonce record for the AES-GCM
/// wrap of the bundle payload, plus the ciphertext itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionEnvelope {
    /// AEAD algorithm identifier ("AES-256-GCM")
    pub algorithm: String,

    /// Content key (base64url)
    pub key_b64u: String,

    /// 12-byte nonce (base64url)
    pub nonce_b64u: String,

    /// Encrypted bundle payload (base64url)
    pub ciphertext_b64u: String,
}

/// Signed, optionally anchored attestation of a subject's consent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofBundle {
    /// Unique bundle identifier
    pub bundle_id: Uuid,

    /// Tenant isolation
    pub tenant_id: TenantId,

    /// Subject the bundle attests for
    pub subject_id: String,

    /// Policy scope, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,

    /// Consent records covered by the bundle, sorted by record id
    pub consents: Vec<ConsentRecord>,

    /// What the bundle attests to
    pub proof_type: ProofType,

    /// SHA-512 of the canonical signing bytes (128 lowercase hex chars)
    pub data_hash: String,

    /// Ed25519 signature over `data_hash` bytes (128 lowercase hex chars)
    pub signature: String,

    /// Ed25519 public key of the signer (64 lowercase hex chars)
    pub public_key: String,

    /// Remote ledger anchors; empty when the oracle was unavailable
    pub snapshot_refs: Vec<SnapshotRef>,

    /// When the bundle was generated
    pub generated_at: DateTime<Utc>,

    /// Optional bundle expiry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional disclosure gate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_lock: Option<TimeLock>,

    /// Optional delegation metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<Delegation>,

    /// Optional encrypted copy of the bundle payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionEnvelope>,
}

impl ProofBundle {
    /// Build the canonical signing value from the bundle's own fields.
    ///
    /// The consent list is re-sorted by record id and timestamps are
    /// rendered with fixed precision, so two bundles over the same
    /// underlying consent set serialize byte-identically regardless of
    /// the order the records were fetched in.
    pub fn signing_value(&self) -> serde_json::Value {
        let mut consents = self.consents.clone();
        consents.sort_by(|a, b| a.id.cmp(&b.id));

        let consent_values: Vec<serde_json::Value> = consents
            .iter()
            .map(|c| {
                serde_json::json!({
                    "id": c.id,
                    "subject_id": c.subject_id,
                    "policy_id": c.policy_id,
                    "purpose": c.purpose,
                    "status": c.status.to_string(),
                    "timestamp": rfc3339_micros(&c.timestamp),
                    "expires_at": c.expires_at.as_ref().map(rfc3339_micros),
                })
            })
            .collect();

        let mut refs = self.snapshot_refs.clone();
        refs.sort_by_key(|r| r.ordinal);

        let ref_values: Vec<serde_json::Value> = refs
            .iter()
            .map(|r| {
                serde_json::json!({
                    "ordinal": r.ordinal,
                    "hash": r.hash,
                    "timestamp": r.timestamp,
                })
            })
            .collect();

        serde_json::json!({
            "subject_id": self.subject_id,
            "consents": consent_values,
            "snapshot_refs": ref_values,
            "generated_at": rfc3339_micros(&self.generated_at),
        })
    }

    /// Canonical signing bytes (RFC 8785 JSON of [`Self::signing_value`]).
    pub fn canonical_signing_bytes(&self) -> Result<Vec<u8>> {
        let canonical = canonicalize_json(&self.signing_value())?;
        Ok(canonical.into_bytes())
    }

    /// Whether the bundle has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now >= e).unwrap_or(false)
    }
}

/// Structured verification outcome.
///
/// Verification never crashes on data-shaped problems; it reports them
/// here so auditing tooling can display partial diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub bundle_id: Uuid,
    pub valid: bool,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl VerificationReport {
    pub fn new(bundle_id: Uuid, issues: Vec<String>) -> Self {
        Self {
            bundle_id,
            valid: issues.is_empty(),
            issues,
            checked_at: Utc::now(),
        }
    }
}

/// One sibling step of a Merkle inclusion proof (hex form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash at this level (64 lowercase hex chars)
    pub sibling: String,

    /// Whether the sibling sits to the left of the running hash
    pub sibling_on_left: bool,
}

/// Inclusion proof for one bundle inside an aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleInclusion {
    pub bundle_id: Uuid,
    pub leaf_index: usize,
    pub leaf_hash: String,
    /// Sibling per level; levels where the node was promoted without a
    /// sibling are omitted entirely.
    pub path: Vec<ProofStep>,
}

/// Merkle root linking multiple proof bundles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedProof {
    pub aggregation_id: Uuid,
    pub tenant_id: TenantId,

    /// SHA-256 Merkle root (64 lowercase hex chars)
    pub root: String,

    /// Leaf hashes in tree order
    pub leaf_hashes: Vec<String>,

    /// One inclusion proof per bundle, in tree order
    pub proofs: Vec<BundleInclusion>,

    /// Bundles covered, in tree order (sorted by bundle id)
    pub bundle_ids: Vec<Uuid>,

    pub created_at: DateTime<Utc>,
}

/// Render a timestamp with fixed microsecond precision for canonical
/// serialization.
pub fn rfc3339_micros(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}
