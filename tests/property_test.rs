//! Property-based tests using proptest.
//!
//! These tests verify invariants that should hold for any valid input.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use uuid::Uuid;

use consent_ledger::crypto::{
    canonicalize_json, sha512, verify_inclusion, BundleSigningKey, MerkleTree,
};
use consent_ledger::domain::{
    ConsentRecord, ConsentStatus, ProofBundle, ProofType, SnapshotRef, TenantId,
};

// ============================================================================
// Custom Strategies
// ============================================================================

/// Generate a random consent status
fn arb_status() -> impl Strategy<Value = ConsentStatus> {
    prop_oneof![
        Just(ConsentStatus::Pending),
        Just(ConsentStatus::Granted),
        Just(ConsentStatus::Revoked),
        Just(ConsentStatus::Expired),
    ]
}

/// Generate a random purpose string
fn arb_purpose() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{2,24}"
}

/// Generate a consent record for a fixed subject
fn arb_record() -> impl Strategy<Value = ConsentRecord> {
    (arb_purpose(), arb_status(), 0i64..4_000_000_000).prop_map(|(purpose, status, secs)| {
        ConsentRecord {
            id: ConsentRecord::record_id("subj-1", &purpose),
            subject_id: "subj-1".to_string(),
            policy_id: None,
            purpose,
            status,
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            expires_at: None,
        }
    })
}

/// Generate a set of consent records with distinct purposes
fn arb_records() -> impl Strategy<Value = Vec<ConsentRecord>> {
    prop::collection::vec(arb_record(), 0..12).prop_map(|mut records| {
        records.sort_by(|a, b| a.purpose.cmp(&b.purpose));
        records.dedup_by(|a, b| a.purpose == b.purpose);
        records
    })
}

/// Generate arbitrary leaf data for Merkle trees
fn arb_leaves() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..48)
}

fn bundle_with(consents: Vec<ConsentRecord>) -> ProofBundle {
    ProofBundle {
        bundle_id: Uuid::new_v4(),
        tenant_id: TenantId::new(),
        subject_id: "subj-1".to_string(),
        policy_id: None,
        consents,
        proof_type: ProofType::ConsentHistory,
        data_hash: String::new(),
        signature: String::new(),
        public_key: String::new(),
        snapshot_refs: vec![SnapshotRef {
            ordinal: 100,
            hash: "abc".to_string(),
            timestamp: 1_750_000_000_000,
        }],
        generated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        expires_at: None,
        time_lock: None,
        delegation: None,
        encryption: None,
    }
}

// ============================================================================
// Canonicalization Properties
// ============================================================================

proptest! {
    /// Canonical bytes are invariant under consent fetch order.
    #[test]
    fn prop_canonical_bytes_ignore_fetch_order(
        records in arb_records(),
        seed in any::<u64>(),
    ) {
        let bundle = bundle_with(records.clone());

        let mut shuffled = records;
        // Cheap deterministic shuffle driven by the seed.
        if shuffled.len() > 1 {
            let n = shuffled.len();
            for i in 0..n {
                let j = (seed as usize).wrapping_mul(i + 1) % n;
                shuffled.swap(i, j);
            }
        }
        let mut reordered = bundle_with(shuffled);
        reordered.generated_at = bundle.generated_at;

        prop_assert_eq!(
            bundle.canonical_signing_bytes().unwrap(),
            reordered.canonical_signing_bytes().unwrap()
        );
    }

    /// Canonicalization is deterministic.
    #[test]
    fn prop_canonicalization_deterministic(records in arb_records()) {
        let bundle = bundle_with(records);
        let value = bundle.signing_value();
        prop_assert_eq!(
            canonicalize_json(&value).unwrap(),
            canonicalize_json(&value).unwrap()
        );
    }
}

// ============================================================================
// Signing Properties
// ============================================================================

proptest! {
    /// Sign/verify round-trips for any payload; any digest bit flip fails.
    #[test]
    fn prop_signing_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..256), flip in 0usize..64) {
        let key = BundleSigningKey::generate();
        let digest = sha512(&payload);
        let signature = key.sign_digest(&digest);

        prop_assert!(key.public_key().verify(&digest, &signature).is_ok());

        let mut tampered = digest;
        tampered[flip] ^= 0x01;
        prop_assert!(key.public_key().verify(&tampered, &signature).is_err());
    }
}

// ============================================================================
// Merkle Properties
// ============================================================================

proptest! {
    /// Every leaf's inclusion proof recomputes the root.
    #[test]
    fn prop_all_inclusion_proofs_verify(leaves in arb_leaves()) {
        let tree = MerkleTree::from_leaf_data(&leaves).unwrap();
        let root = tree.root();

        for index in 0..tree.leaf_count() {
            let proof = tree.prove(index).unwrap();
            prop_assert!(verify_inclusion(&proof.leaf_hash, &proof.path, &root));
        }
    }

    /// Changing any single leaf changes the root.
    #[test]
    fn prop_leaf_change_changes_root(leaves in arb_leaves(), index in any::<prop::sample::Index>()) {
        let tree = MerkleTree::from_leaf_data(&leaves).unwrap();

        let mut mutated = leaves.clone();
        let target = index.index(mutated.len());
        mutated[target].push(0xff);

        let mutated_tree = MerkleTree::from_leaf_data(&mutated).unwrap();
        prop_assert_ne!(tree.root(), mutated_tree.root());
    }

    /// A proof never verifies against another leaf's position.
    #[test]
    fn prop_proof_is_position_bound(leaves in arb_leaves()) {
        prop_assume!(leaves.len() >= 2);
        // Distinct leaf content so hashes differ.
        let leaves: Vec<Vec<u8>> = leaves
            .into_iter()
            .enumerate()
            .map(|(i, mut leaf)| {
                leaf.extend_from_slice(&(i as u64).to_be_bytes());
                leaf
            })
            .collect();

        let tree = MerkleTree::from_leaf_data(&leaves).unwrap();
        let root = tree.root();

        let proof0 = tree.prove(0).unwrap();
        let proof1 = tree.prove(1).unwrap();
        prop_assert!(!verify_inclusion(&proof0.leaf_hash, &proof1.path, &root) || proof0.path == proof1.path);
    }
}
