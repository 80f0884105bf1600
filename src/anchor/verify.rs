/// Pre-broadcast check that a signed transaction still anchors the
/// expected commitment.
///
/// The signed transaction is serialized, parsed back with the chain's own
/// decoder, and the anchored payload is extracted from the parsed form.
/// Nothing is broadcast unless the payload matches byte for byte.
use alloy::consensus::TxEnvelope;
use alloy::eips::eip2718::Decodable2718;
use bitcoin::script::Instruction;
use bitcoin::Transaction;
use tracing::{error, info};

use super::SignedTransaction;
use crate::chain::BlockchainType;
use crate::error::{AnchorError, Result};

pub fn verify_transaction(signed: &SignedTransaction, expected: &[u8; 32]) -> Result<()> {
    let raw = signed.serialize();
    let payload = extract_payload(signed.blockchain_type(), &raw)?;

    if payload.as_slice() != expected.as_slice() {
        error!(
            expected = %hex::encode(expected),
            found = %hex::encode(&payload),
            "Signed transaction does not carry the expected commitment"
        );
        return Err(AnchorError::UnverifiedTransaction {
            expected: hex::encode(expected),
            found: hex::encode(&payload),
        });
    }

    info!(payload = %hex::encode(expected), "Verified transaction payload");
    Ok(())
}

/// Decode `raw` and return the anchored payload.
pub fn extract_payload(kind: BlockchainType, raw: &[u8]) -> Result<Vec<u8>> {
    match kind {
        BlockchainType::Bitcoin => {
            let tx: Transaction = bitcoin::consensus::deserialize(raw)
                .map_err(|e| unverified(format!("undecodable transaction: {e}")))?;
            op_return_payload(&tx)
        }
        BlockchainType::Ethereum => {
            let envelope = TxEnvelope::decode_2718(&mut &raw[..])
                .map_err(|e| unverified(format!("undecodable transaction: {e}")))?;
            match envelope {
                TxEnvelope::Legacy(signed) => Ok(signed.tx().input.to_vec()),
                other => Err(unverified(format!(
                    "unexpected transaction type {:?}",
                    other.tx_type()
                ))),
            }
        }
        BlockchainType::Mock => Err(unverified("mock transactions carry no payload".into())),
    }
}

/// Data pushed by the first OP_RETURN output.
fn op_return_payload(tx: &Transaction) -> Result<Vec<u8>> {
    let script = tx
        .output
        .iter()
        .map(|o| &o.script_pubkey)
        .find(|s| s.is_op_return())
        .ok_or_else(|| unverified("no OP_RETURN output".into()))?;

    let mut payload = Vec::new();
    // Skip the OP_RETURN opcode itself.
    for instruction in script.instructions().skip(1) {
        match instruction.map_err(|e| unverified(format!("malformed OP_RETURN script: {e}")))? {
            Instruction::PushBytes(bytes) => payload.extend_from_slice(bytes.as_bytes()),
            Instruction::Op(op) => {
                return Err(unverified(format!("unexpected opcode {op} in OP_RETURN output")))
            }
        }
    }
    Ok(payload)
}

fn unverified(found: String) -> AnchorError {
    AnchorError::UnverifiedTransaction {
        expected: "a 32-byte commitment".into(),
        found,
    }
}
