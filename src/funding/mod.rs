/// Funding inputs and the connectors that supply them.
///
/// All amounts are integers in the chain's smallest unit (satoshi, wei).
pub mod selection;

use async_trait::async_trait;
use bitcoin::{OutPoint, ScriptBuf, Txid};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use selection::{select_inputs, SelectionKind, SelectionStrategy, Shuffled, SmallestFirst};

/// Amount in the chain's smallest unit. Wide enough for wei balances.
pub type Amount = u128;

/// A spendable output that can fund the anchoring transaction.
///
/// Ownership moves from the connector to the transaction builder at
/// selection time; an input is consumed by exactly one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingInput {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    /// Locking script of the output being spent.
    pub script_pubkey: ScriptBuf,
}

impl FundingInput {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// A payment the anchoring transaction makes alongside the commitment,
/// e.g. a dust output to a recipient or revocation address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentOutput {
    pub address: String,
    /// Value in satoshis.
    pub value: u64,
}

/// Source of spendable funds for an issuing address.
#[async_trait]
pub trait FundingConnector: Send + Sync {
    /// Human-readable name of this connector (e.g., "esplora").
    fn name(&self) -> &str;

    /// Unspent outputs at `address`. Account-model chains return none.
    async fn spendable_inputs(&self, address: &str) -> Result<Vec<FundingInput>>;

    /// Spendable balance at `address`.
    async fn balance(&self, address: &str) -> Result<Amount>;
}

/// Transaction counter for account-model chains.
#[async_trait]
pub trait NonceSource: Send + Sync {
    async fn nonce(&self, address: &str) -> Result<u64>;
}
