//! Merkle aggregation of proof bundles.
//!
//! Combines multiple bundles into one verifiable root. Leaf order is
//! fixed by sorting on bundle id, so the same bundle set always yields
//! the same root. Leaves are the SHA-256 of each bundle's `data_hash`
//! bytes.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::crypto::{self, InclusionStep, MerkleTree};
use crate::domain::{AggregatedProof, BundleInclusion, ProofBundle, ProofStep, TenantId};
use crate::infra::{BundleStore, LedgerError, Result};
use crate::metrics::{metric_names, MetricsRegistry};

/// Builds and persists aggregated proofs.
pub struct ProofAggregator {
    bundles: Arc<dyn BundleStore>,
    metrics: Arc<MetricsRegistry>,
}

impl ProofAggregator {
    pub fn new(bundles: Arc<dyn BundleStore>, metrics: Arc<MetricsRegistry>) -> Self {
        Self { bundles, metrics }
    }

    /// Aggregate bundles into a Merkle root with per-bundle inclusion
    /// proofs, and persist the result atomically.
    ///
    /// Fails with `EmptyMerkleInput` for zero bundles and with an
    /// invariant violation when bundles span tenants.
    pub async fn aggregate(
        &self,
        tenant_id: &TenantId,
        bundles: &[ProofBundle],
    ) -> Result<AggregatedProof> {
        if bundles.is_empty() {
            return Err(LedgerError::EmptyMerkleInput);
        }
        if bundles.iter().any(|b| &b.tenant_id != tenant_id) {
            return Err(LedgerError::Invariant(
                "aggregation cannot span tenants".to_string(),
            ));
        }

        let mut sorted: Vec<&ProofBundle> = bundles.iter().collect();
        sorted.sort_by_key(|b| b.bundle_id);

        let leaf_data: Vec<Vec<u8>> = sorted
            .iter()
            .map(|b| {
                hex::decode(&b.data_hash).map_err(|_| {
                    LedgerError::Codec(format!(
                        "bundle {} has a non-hex data hash",
                        b.bundle_id
                    ))
                })
            })
            .collect::<Result<_>>()?;

        let tree = MerkleTree::from_leaf_data(&leaf_data)?;

        let proofs: Vec<BundleInclusion> = sorted
            .iter()
            .enumerate()
            .map(|(index, bundle)| {
                let proof = tree
                    .prove(index)
                    .ok_or_else(|| LedgerError::Internal("leaf index out of range".to_string()))?;
                Ok(BundleInclusion {
                    bundle_id: bundle.bundle_id,
                    leaf_index: index,
                    leaf_hash: hex::encode(proof.leaf_hash),
                    path: proof
                        .path
                        .iter()
                        .map(|step| ProofStep {
                            sibling: hex::encode(step.sibling),
                            sibling_on_left: step.sibling_on_left,
                        })
                        .collect(),
                })
            })
            .collect::<Result<_>>()?;

        let aggregated = AggregatedProof {
            aggregation_id: Uuid::new_v4(),
            tenant_id: tenant_id.clone(),
            root: hex::encode(tree.root()),
            leaf_hashes: tree.leaves().iter().map(hex::encode).collect(),
            proofs,
            bundle_ids: sorted.iter().map(|b| b.bundle_id).collect(),
            created_at: Utc::now(),
        };

        self.bundles.put_aggregated(&aggregated).await?;
        self.metrics
            .inc_counter(metric_names::PROOFS_AGGREGATED)
            .await;

        info!(
            aggregation_id = %aggregated.aggregation_id,
            bundles = aggregated.bundle_ids.len(),
            root = %aggregated.root,
            "proof bundles aggregated"
        );

        Ok(aggregated)
    }
}

/// Recompute one bundle's inclusion proof against an aggregation root.
///
/// Returns `false` for unknown bundles or malformed hex rather than
/// erroring; a proof that cannot be decoded cannot prove inclusion.
pub fn verify_bundle_inclusion(aggregated: &AggregatedProof, bundle_id: Uuid) -> bool {
    let Some(inclusion) = aggregated.proofs.iter().find(|p| p.bundle_id == bundle_id) else {
        return false;
    };

    let Ok(root) = decode_hash(&aggregated.root) else {
        return false;
    };
    let Ok(leaf_hash) = decode_hash(&inclusion.leaf_hash) else {
        return false;
    };

    let mut path = Vec::with_capacity(inclusion.path.len());
    for step in &inclusion.path {
        let Ok(sibling) = decode_hash(&step.sibling) else {
            return false;
        };
        path.push(InclusionStep {
            sibling,
            sibling_on_left: step.sibling_on_left,
        });
    }

    crypto::verify_inclusion(&leaf_hash, &path, &root)
}

fn decode_hash(hex_str: &str) -> std::result::Result<[u8; 32], ()> {
    let bytes = hex::decode(hex_str).map_err(|_| ())?;
    bytes.try_into().map_err(|_| ())
}
