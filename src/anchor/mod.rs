/// Anchoring a Merkle root on chain.
///
/// A chain handler turns a 32-byte commitment into a transaction, gets it
/// signed inside a secure signing session, checks that the signed bytes
/// still carry the commitment, and broadcasts it:
///
/// ```text
/// commitment ─▶ build ─▶ sign (session) ─▶ verify ─▶ broadcast ─▶ tx id
/// ```
///
/// Supported chains:
/// - Bitcoin: OP_RETURN output
/// - Ethereum: calldata of a legacy transaction to the burn address
/// - Mockchain: no transaction, for dry runs and tests
pub mod bitcoin;
pub mod broadcast;
pub mod cost;
pub mod ethereum;
pub mod mock;
pub mod providers;
pub mod verify;

use ::bitcoin::consensus::encode::serialize as consensus_serialize;
use ::bitcoin::{Transaction, TxOut};
use alloy::consensus::{TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use async_trait::async_trait;

use crate::chain::{BlockchainType, Chain};
use crate::error::Result;
use crate::signer::SecureSigner;

/// A transaction that carries the commitment but no signatures yet.
#[derive(Debug, Clone)]
pub enum UnsignedTransaction {
    Bitcoin {
        tx: Transaction,
        /// Outputs being spent, in input order. Needed for sighashes.
        prevouts: Vec<TxOut>,
    },
    Ethereum(TxLegacy),
}

impl UnsignedTransaction {
    pub fn blockchain_type(&self) -> BlockchainType {
        match self {
            UnsignedTransaction::Bitcoin { .. } => BlockchainType::Bitcoin,
            UnsignedTransaction::Ethereum(_) => BlockchainType::Ethereum,
        }
    }
}

/// A fully signed transaction, ready for verification and broadcast.
#[derive(Debug, Clone)]
pub enum SignedTransaction {
    Bitcoin(Transaction),
    Ethereum(TxEnvelope),
}

impl SignedTransaction {
    pub fn blockchain_type(&self) -> BlockchainType {
        match self {
            SignedTransaction::Bitcoin(_) => BlockchainType::Bitcoin,
            SignedTransaction::Ethereum(_) => BlockchainType::Ethereum,
        }
    }

    /// Raw network serialization.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            SignedTransaction::Bitcoin(tx) => consensus_serialize(tx),
            SignedTransaction::Ethereum(envelope) => envelope.encoded_2718(),
        }
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    /// Transaction id computed locally from the signed bytes.
    pub fn tx_id(&self) -> String {
        match self {
            SignedTransaction::Bitcoin(tx) => tx.compute_txid().to_string(),
            SignedTransaction::Ethereum(envelope) => format!("{:#x}", envelope.tx_hash()),
        }
    }
}

/// Chain-specific issuing: balance checks, building, signing, verifying
/// and broadcasting the anchoring transaction.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    fn chain(&self) -> Chain;

    /// Fail with `InsufficientFunds` unless the issuing address can pay
    /// for one anchoring transaction. Performs no transaction work.
    async fn ensure_balance(&self) -> Result<()>;

    /// Anchor `commitment` and return the network's transaction id.
    async fn issue_transaction(&mut self, commitment: &[u8; 32]) -> Result<String>;
}

/// Sign `unsigned` inside a signing session. The session is finished
/// (key discarded, safe-mode stop wait) whether or not signing succeeded.
pub(crate) async fn sign_in_session(
    signer: &mut SecureSigner,
    unsigned: UnsignedTransaction,
) -> Result<SignedTransaction> {
    let mut session = signer.session().await?;
    let signed = session.sign(unsigned);
    let finished = session.finish().await;
    let signed = signed?;
    finished?;
    Ok(signed)
}
