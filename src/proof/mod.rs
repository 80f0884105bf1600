/// Per-document proofs of inclusion in an anchored batch.
///
/// A receipt binds a leaf's Merkle path to the transaction that anchored
/// the root:
///
/// ```json
/// {
///   "id": "urn:uuid:…",
///   "target": "<leaf hash>",
///   "root": "<merkle root>",
///   "path": [{"right": "…"}, {"left": "…"}],
///   "anchor": {"chain": "bitcoinMainnet", "transactionId": "…", "type": "BTCOpReturn"},
///   "previousProof": "urn:uuid:…"
/// }
/// ```
pub mod chained;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::chain::Chain;
use crate::crypto::hash::hex32;
use crate::document::{hash_document, without_proof, DocumentNormalizer};
use crate::error::{AnchorError, Result};
use crate::merkle::proof::compute_root;
use crate::merkle::{MerkleTree, PathStep};

pub use chained::{attach_proof, proof_entries, receipt_from_entry, ChainedProof, DocumentProof};

/// Where a root was anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
    pub chain: String,
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub anchor_type: String,
}

impl Anchor {
    pub fn new(chain: Chain, tx_id: &str) -> Self {
        Self {
            chain: chain.display_name().to_string(),
            transaction_id: tx_id.to_string(),
            anchor_type: chain.anchor_type().to_string(),
        }
    }
}

/// Merkle receipt for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub id: String,
    #[serde(with = "hex32")]
    pub target: [u8; 32],
    #[serde(with = "hex32")]
    pub root: [u8; 32],
    pub path: Vec<PathStep>,
    pub anchor: Anchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_proof: Option<String>,
}

impl Proof {
    /// Link this proof to an earlier anchoring of the same document.
    pub fn chained_to(mut self, previous_id: &str) -> Self {
        self.previous_proof = Some(previous_id.to_string());
        self
    }
}

pub fn new_proof_id() -> String {
    format!("urn:uuid:{}", Uuid::new_v4())
}

/// One receipt per leaf, in leaf order.
pub fn assemble(tree: &MerkleTree, tx_id: &str, chain: Chain) -> Result<Vec<Proof>> {
    let root = tree.root()?;
    let anchor = Anchor::new(chain, tx_id);

    let proofs: Vec<Proof> = tree
        .prove_all()?
        .into_iter()
        .map(|path| Proof {
            id: new_proof_id(),
            target: path.leaf_hash,
            root,
            path: path.siblings,
            anchor: anchor.clone(),
            previous_proof: None,
        })
        .collect();

    debug!(count = proofs.len(), tx_id, "Assembled proofs");
    Ok(proofs)
}

/// Whether the receipt's path leads from its target to its root.
pub fn verify_receipt(proof: &Proof) -> bool {
    compute_root(&proof.target, &proof.path) == proof.root
}

/// Check every proof attached to `document` and return their receipts.
///
/// Each receipt must walk to its root and target the hash of the
/// document's content (see [`without_proof`]). Every receipt after the
/// first must link back to the receipt before it.
pub fn verify_document(
    document: &serde_json::Value,
    normalizer: &dyn DocumentNormalizer,
) -> Result<Vec<Proof>> {
    let leaf = hash_document(&normalizer.normalize(&without_proof(document))?);
    let entries = proof_entries(document);
    if entries.is_empty() {
        return Err(AnchorError::MalformedDocument("document has no proof".into()));
    }

    let mut receipts: Vec<Proof> = Vec::with_capacity(entries.len());
    for entry in entries {
        let receipt = receipt_from_entry(entry)?;
        if let Some(previous) = receipts.last() {
            if receipt.previous_proof.as_deref() != Some(previous.id.as_str()) {
                return Err(AnchorError::InvalidProof(format!(
                    "{} does not chain to the preceding proof {}",
                    receipt.id, previous.id
                )));
            }
        }
        receipts.push(receipt);
    }

    receipts
        .into_iter()
        .map(|receipt| {
            if receipt.target != leaf {
                return Err(AnchorError::InvalidProof(format!(
                    "{} targets {}, document hashes to {}",
                    receipt.id,
                    hex::encode(receipt.target),
                    hex::encode(leaf)
                )));
            }
            if !verify_receipt(&receipt) {
                return Err(AnchorError::InvalidProof(format!(
                    "{} path does not lead to root {}",
                    receipt.id,
                    hex::encode(receipt.root)
                )));
            }
            Ok(receipt)
        })
        .collect()
}
