//! Merkle tree with odd-node promotion.
//!
//! Leaves are SHA-256 hashes of caller-supplied data, in caller-supplied
//! order. Adjacent nodes are paired and hashed bottom-up; an odd node at
//! any level promotes unchanged to the next level (no duplication
//! padding). Every leaf gets an inclusion proof of one sibling per
//! level, with promoted levels omitted from the path.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{hash_pair, sha256, Hash256};

/// Error type for Merkle operations
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    #[error("merkle input is empty")]
    EmptyInput,
}

/// One sibling step of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionStep {
    /// Sibling hash at this level
    pub sibling: Hash256,

    /// Whether the sibling sits to the left of the running hash
    pub sibling_on_left: bool,
}

/// Inclusion proof for a single leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InclusionProof {
    pub leaf_index: usize,
    pub leaf_hash: Hash256,
    pub path: Vec<InclusionStep>,
}

/// Merkle tree over hashed leaves, all levels retained.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// levels[0] is the leaf level, last level holds the root
    levels: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a tree over raw leaf data; each leaf is hashed with SHA-256.
    pub fn from_leaf_data<T: AsRef<[u8]>>(leaf_data: &[T]) -> Result<Self, MerkleError> {
        let leaves: Vec<Hash256> = leaf_data.iter().map(|d| sha256(d.as_ref())).collect();
        Self::from_leaves(leaves)
    }

    /// Build a tree over already-hashed leaves.
    pub fn from_leaves(leaves: Vec<Hash256>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyInput);
        }

        let mut levels = vec![leaves];
        while levels.last().map(Vec::len).unwrap_or(0) > 1 {
            let prev = levels.last().expect("levels is non-empty");
            let mut next = Vec::with_capacity((prev.len() + 1) / 2);
            for pair in prev.chunks(2) {
                match pair {
                    [left, right] => next.push(hash_pair(left, right)),
                    // odd node: promote unchanged
                    [single] => next.push(*single),
                    _ => unreachable!("chunks(2) yields 1 or 2 elements"),
                }
            }
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// The single remaining hash at the top level.
    pub fn root(&self) -> Hash256 {
        self.levels
            .last()
            .and_then(|l| l.first())
            .copied()
            .expect("tree is never empty")
    }

    /// Leaf hashes in tree order.
    pub fn leaves(&self) -> &[Hash256] {
        &self.levels[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Inclusion proof for the leaf at `leaf_index`.
    ///
    /// Returns `None` when the index is out of range. Levels where the
    /// running node was promoted without a sibling contribute no step.
    pub fn prove(&self, leaf_index: usize) -> Option<InclusionProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::new();
        let mut idx = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            if idx % 2 == 0 {
                if let Some(sibling) = level.get(idx + 1) {
                    path.push(InclusionStep {
                        sibling: *sibling,
                        sibling_on_left: false,
                    });
                }
                // else: promoted, no step at this level
            } else {
                path.push(InclusionStep {
                    sibling: level[idx - 1],
                    sibling_on_left: true,
                });
            }
            idx /= 2;
        }

        Some(InclusionProof {
            leaf_index,
            leaf_hash: self.levels[0][leaf_index],
            path,
        })
    }
}

/// Recompute the root from a leaf hash and its proof path.
pub fn verify_inclusion(leaf_hash: &Hash256, path: &[InclusionStep], root: &Hash256) -> bool {
    let mut current = *leaf_hash;
    for step in path {
        current = if step.sibling_on_left {
            hash_pair(&step.sibling, &current)
        } else {
            hash_pair(&current, &step.sibling)
        };
    }
    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("leaf-{i}").into_bytes()).collect()
    }

    #[test]
    fn test_empty_input_rejected() {
        let empty: Vec<Vec<u8>> = vec![];
        assert!(matches!(
            MerkleTree::from_leaf_data(&empty),
            Err(MerkleError::EmptyInput)
        ));
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::from_leaf_data(&[b"only".to_vec()]).unwrap();
        assert_eq!(tree.root(), sha256(b"only"));

        let proof = tree.prove(0).unwrap();
        assert!(proof.path.is_empty());
        assert!(verify_inclusion(&proof.leaf_hash, &proof.path, &tree.root()));
    }

    #[test]
    fn test_odd_count_promotes_last_leaf() {
        let data = vec![b"h1".to_vec(), b"h2".to_vec(), b"h3".to_vec()];
        let tree = MerkleTree::from_leaf_data(&data).unwrap();

        // Root must be H(H(h1,h2), h3) with h3 promoted unchanged.
        let l = [sha256(b"h1"), sha256(b"h2"), sha256(b"h3")];
        let expected_root = hash_pair(&hash_pair(&l[0], &l[1]), &l[2]);
        assert_eq!(tree.root(), expected_root);

        // Leaf 2's proof is one step shorter than leaf 0's.
        let proof0 = tree.prove(0).unwrap();
        let proof2 = tree.prove(2).unwrap();
        assert_eq!(proof0.path.len(), 2);
        assert_eq!(proof2.path.len(), 1);

        // The promoted leaf's only sibling is on its left.
        assert!(proof2.path[0].sibling_on_left);
    }

    #[test]
    fn test_all_proofs_recompute_root() {
        for n in 1..=17 {
            let data = leaves(n);
            let tree = MerkleTree::from_leaf_data(&data).unwrap();
            let root = tree.root();

            for i in 0..n {
                let proof = tree.prove(i).unwrap();
                assert!(
                    verify_inclusion(&proof.leaf_hash, &proof.path, &root),
                    "proof for leaf {i} of {n} must recompute the root"
                );
            }
        }
    }

    #[test]
    fn test_proof_out_of_range() {
        let tree = MerkleTree::from_leaf_data(&leaves(3)).unwrap();
        assert!(tree.prove(3).is_none());
    }

    #[test]
    fn test_tampered_leaf_fails_verification() {
        let tree = MerkleTree::from_leaf_data(&leaves(4)).unwrap();
        let proof = tree.prove(1).unwrap();

        let mut tampered = proof.leaf_hash;
        tampered[0] ^= 0xff;
        assert!(!verify_inclusion(&tampered, &proof.path, &tree.root()));
    }

    #[test]
    fn test_leaf_order_affects_root() {
        let tree1 = MerkleTree::from_leaf_data(&[b"a".to_vec(), b"b".to_vec()]).unwrap();
        let tree2 = MerkleTree::from_leaf_data(&[b"b".to_vec(), b"a".to_vec()]).unwrap();
        assert_ne!(tree1.root(), tree2.root());
    }
}
