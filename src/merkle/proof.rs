/// Merkle inclusion proof generation and verification.
use serde::{Deserialize, Serialize};

use super::tree::MerkleTree;
use crate::crypto::hash::{hash_pair, hex32};
use crate::error::{AnchorError, Result};

/// One step of an inclusion path: the sibling hash and which side it sits on.
///
/// Serializes as `{"left": "<hex>"}` / `{"right": "<hex>"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStep {
    Left(#[serde(with = "hex32")] [u8; 32]),
    Right(#[serde(with = "hex32")] [u8; 32]),
}

impl PathStep {
    pub fn sibling(&self) -> &[u8; 32] {
        match self {
            PathStep::Left(h) | PathStep::Right(h) => h,
        }
    }

    /// Fold this step into the running hash.
    pub fn apply(&self, current: &[u8; 32]) -> [u8; 32] {
        match self {
            PathStep::Left(sibling) => hash_pair(sibling, current),
            PathStep::Right(sibling) => hash_pair(current, sibling),
        }
    }
}

/// A Merkle inclusion proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    pub leaf_index: usize,
    #[serde(with = "hex32")]
    pub leaf_hash: [u8; 32],
    pub siblings: Vec<PathStep>,
}

impl MerkleTree {
    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove(&self, index: usize) -> Result<MerklePath> {
        let leaf_hash = self.leaf(index)?;

        let mut siblings = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = idx ^ 1;
            if let Some(sibling) = level.get(sibling_idx) {
                siblings.push(if idx % 2 == 0 {
                    PathStep::Right(*sibling)
                } else {
                    PathStep::Left(*sibling)
                });
            }
            // If sibling doesn't exist (odd promotion), no sibling needed at this level

            idx /= 2;
        }

        Ok(MerklePath {
            leaf_index: index,
            leaf_hash,
            siblings,
        })
    }

    /// Proofs for every leaf, in leaf order.
    pub fn prove_all(&self) -> Result<Vec<MerklePath>> {
        if !self.is_populated() {
            return Err(AnchorError::TreeNotPopulated);
        }
        (0..self.leaf_count()).map(|i| self.prove(i)).collect()
    }
}

/// Recompute the root implied by `leaf_hash` and `siblings`.
pub fn compute_root(leaf_hash: &[u8; 32], siblings: &[PathStep]) -> [u8; 32] {
    siblings
        .iter()
        .fold(*leaf_hash, |current, step| step.apply(&current))
}

/// Verify a Merkle inclusion proof against a known root.
pub fn verify_proof(root: &[u8; 32], proof: &MerklePath) -> bool {
    &compute_root(&proof.leaf_hash, &proof.siblings) == root
}
