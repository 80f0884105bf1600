/// Signature-suite proofs embedded in issued documents.
///
/// A document carries its anchoring proof under `proof`. The first
/// anchoring writes a `MerkleProof2019` object there. Re-anchoring an
/// already issued document turns `proof` into a list and appends a
/// `ChainedProof2021` that points back at the previous entry's id, so the
/// document accumulates an append-only chain of anchoring events.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Proof;
use crate::error::{AnchorError, Result};

pub const MERKLE_PROOF_2019: &str = "MerkleProof2019";
pub const CHAINED_PROOF_2021: &str = "ChainedProof2021";
pub const ASSERTION_METHOD: &str = "assertionMethod";

/// Multibase prefix for lowercase base16.
const BASE16_PREFIX: char = 'f';

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProof {
    pub id: String,
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub proof_value: String,
}

impl DocumentProof {
    /// Wrap a receipt as a `MerkleProof2019` proof.
    pub fn from_receipt(
        receipt: &Proof,
        verification_method: &str,
        created: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Self {
            id: receipt.id.clone(),
            proof_type: MERKLE_PROOF_2019.to_string(),
            created: created.to_rfc3339_opts(SecondsFormat::Secs, true),
            proof_purpose: ASSERTION_METHOD.to_string(),
            verification_method: verification_method.to_string(),
            proof_value: encode_proof_value(receipt)?,
        })
    }

    /// Decode the receipt held in `proofValue`.
    pub fn receipt(&self) -> Result<Proof> {
        decode_proof_value(&self.proof_value)
    }

    /// The same proof with its receipt linked to `previous_id`.
    fn chained_to(&self, previous_id: &str) -> Result<Self> {
        let receipt = self.receipt()?.chained_to(previous_id);
        Ok(Self {
            proof_value: encode_proof_value(&receipt)?,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedProof {
    pub id: String,
    #[serde(rename = "type")]
    pub proof_type: String,
    pub chained_proof_type: String,
    pub created: String,
    pub proof_purpose: String,
    pub verification_method: String,
    pub proof_value: String,
    pub previous_proof: String,
}

impl ChainedProof {
    /// Chain `current` onto the proof identified by `previous_id`.
    ///
    /// The receipt inside `proofValue` is relinked too, so the link
    /// survives when only the receipt is kept.
    pub fn new(previous_id: &str, current: &DocumentProof) -> Result<Self> {
        let linked = current.chained_to(previous_id)?;
        Ok(Self {
            id: linked.id,
            proof_type: CHAINED_PROOF_2021.to_string(),
            chained_proof_type: linked.proof_type,
            created: linked.created,
            proof_purpose: linked.proof_purpose,
            verification_method: linked.verification_method,
            proof_value: linked.proof_value,
            previous_proof: previous_id.to_string(),
        })
    }

    pub fn receipt(&self) -> Result<Proof> {
        decode_proof_value(&self.proof_value)
    }
}

fn encode_proof_value(receipt: &Proof) -> Result<String> {
    let encoded = serde_json::to_vec(receipt)?;
    Ok(format!("{BASE16_PREFIX}{}", hex::encode(encoded)))
}

fn decode_proof_value(proof_value: &str) -> Result<Proof> {
    let encoded = proof_value.strip_prefix(BASE16_PREFIX).ok_or_else(|| {
        AnchorError::MalformedDocument("proofValue is not multibase base16".into())
    })?;
    let bytes = hex::decode(encoded)
        .map_err(|e| AnchorError::MalformedDocument(format!("proofValue: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Write `proof` into `document`.
///
/// Sets `proof` if the document has none. Otherwise the existing proof
/// becomes the first element of a list and a chained proof referencing
/// the last entry is appended.
pub fn attach_proof(document: &mut Value, proof: &DocumentProof) -> Result<()> {
    let object = document
        .as_object_mut()
        .ok_or_else(|| AnchorError::MalformedDocument("document is not a JSON object".into()))?;

    let Some(existing) = object.get("proof") else {
        object.insert("proof".to_string(), serde_json::to_value(proof)?);
        return Ok(());
    };

    let last = match existing {
        Value::Array(entries) => entries.last(),
        single => Some(single),
    };
    let previous_id = last
        .and_then(|p| p.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| AnchorError::MalformedDocument("existing proof has no id".into()))?;
    let chained = serde_json::to_value(ChainedProof::new(previous_id, proof)?)?;

    let mut entries = match object.remove("proof") {
        Some(Value::Array(entries)) => entries,
        Some(single) => vec![single],
        None => Vec::new(),
    };
    entries.push(chained);
    object.insert("proof".to_string(), Value::Array(entries));
    Ok(())
}

/// Document proofs in the order they were attached.
pub fn proof_entries(document: &Value) -> Vec<&Value> {
    match document.get("proof") {
        Some(Value::Array(entries)) => entries.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    }
}

/// Decode the receipt carried by a proof entry of either type.
pub fn receipt_from_entry(entry: &Value) -> Result<Proof> {
    let proof_value = entry
        .get("proofValue")
        .and_then(Value::as_str)
        .ok_or_else(|| AnchorError::MalformedDocument("proof has no proofValue".into()))?;
    decode_proof_value(proof_value)
}
