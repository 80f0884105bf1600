/// Documents and batches.
///
/// A batch is an insertion-ordered mapping `uid -> canonical bytes`. The
/// position of a document in the batch is its leaf index in the Merkle
/// tree, and the i-th proof returned for the batch belongs to the i-th
/// document.
pub mod normalize;

use std::collections::HashSet;

use tracing::debug;

use crate::crypto::hash;
use crate::error::{AnchorError, Result};

pub use normalize::{CanonicalJson, DocumentNormalizer};

/// Leaf hash of a canonicalized document.
pub fn hash_document(canonical: &[u8]) -> [u8; 32] {
    hash::hash(canonical)
}

/// The document content that gets anchored: everything except `proof`.
///
/// Re-anchoring an issued document therefore commits to the same leaf
/// as the first anchoring did.
pub fn without_proof(document: &serde_json::Value) -> serde_json::Value {
    let mut content = document.clone();
    if let Some(object) = content.as_object_mut() {
        object.remove("proof");
    }
    content
}

/// A canonicalized document awaiting anchoring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uid: String,
    pub canonical: Vec<u8>,
}

/// Ordered set of documents anchored by one transaction.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    documents: Vec<Document>,
    uids: HashSet<String>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document. Uids must be unique within the batch.
    pub fn insert(&mut self, uid: impl Into<String>, canonical: Vec<u8>) -> Result<()> {
        let uid = uid.into();
        if !self.uids.insert(uid.clone()) {
            return Err(AnchorError::DuplicateDocument(uid));
        }
        debug!(uid = %uid, bytes = canonical.len(), "Document added to batch");
        self.documents.push(Document { uid, canonical });
        Ok(())
    }

    /// Normalize and append a JSON document.
    pub fn insert_json(
        &mut self,
        uid: impl Into<String>,
        document: &serde_json::Value,
        normalizer: &dyn DocumentNormalizer,
    ) -> Result<()> {
        let canonical = normalizer.normalize(document)?;
        self.insert(uid, canonical)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(|d| d.uid.as_str())
    }

    /// Leaf hashes in batch order.
    pub fn leaf_hashes(&self) -> Vec<[u8; 32]> {
        self.documents
            .iter()
            .map(|d| hash_document(&d.canonical))
            .collect()
    }
}
