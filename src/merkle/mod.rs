pub mod proof;
pub mod tree;

pub use proof::{verify_proof, MerklePath, PathStep};
pub use tree::MerkleTree;
