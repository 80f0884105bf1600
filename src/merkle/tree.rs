/// SHA-256 Merkle tree over document leaf hashes.
///
///   internal_hash(l, r) = SHA256(l || r)
///
/// Leaves are supplied already hashed (see `document::hash_document`).
/// If the number of nodes at any level is odd, the last node is promoted
/// unchanged to the next level. This is the policy the issued proofs and
/// the reference root `0932f1d2…9044` for leaves `1,2,3` depend on.
use crate::crypto::hash::hash_pair;
use crate::error::{AnchorError, Result};

/// A SHA-256 Merkle tree.
///
/// Building is a pure function of the ordered leaf list: the same leaves
/// always yield the same levels, root and proofs.
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    /// All levels of the tree. levels[0] = leaves, levels[last] = [root].
    /// Empty until populated.
    pub(crate) levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from ordered leaf hashes.
    pub fn from_leaf_hashes(leaves: Vec<[u8; 32]>) -> Result<Self> {
        let mut tree = Self::new();
        tree.populate(leaves)?;
        Ok(tree)
    }

    /// Store the ordered leaves and build every level.
    ///
    /// Replaces any previous contents. An empty leaf list is rejected.
    pub fn populate(&mut self, leaves: Vec<[u8; 32]>) -> Result<()> {
        if leaves.is_empty() {
            return Err(AnchorError::EmptyBatch);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = next_level(current);
            levels.push(next);
        }

        self.levels = levels;
        Ok(())
    }

    pub fn is_populated(&self) -> bool {
        !self.levels.is_empty()
    }

    /// The Merkle root; errors before `populate`.
    pub fn root(&self) -> Result<[u8; 32]> {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .ok_or(AnchorError::TreeNotPopulated)
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    /// Get the leaf hashes.
    pub fn leaves(&self) -> &[[u8; 32]] {
        self.levels.first().map_or(&[], |l| l.as_slice())
    }

    pub fn leaf(&self, index: usize) -> Result<[u8; 32]> {
        if !self.is_populated() {
            return Err(AnchorError::TreeNotPopulated);
        }
        self.leaves()
            .get(index)
            .copied()
            .ok_or(AnchorError::LeafIndexOutOfRange {
                index,
                count: self.leaf_count(),
            })
    }

    /// Get all levels (for debugging/testing).
    pub fn levels(&self) -> &[Vec<[u8; 32]>] {
        &self.levels
    }
}

fn next_level(current: &[[u8; 32]]) -> Vec<[u8; 32]> {
    let mut next = Vec::with_capacity(current.len().div_ceil(2));
    for pair in current.chunks(2) {
        match pair {
            [left, right] => next.push(hash_pair(left, right)),
            // Odd node: promote without duplication
            [last] => next.push(*last),
            _ => unreachable!("chunks(2) yields one or two nodes"),
        }
    }
    next
}
