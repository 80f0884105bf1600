/// One issuing run: documents in, anchored proofs out.
///
/// ```text
/// batch ─▶ leaf hashes ─▶ Merkle tree ─▶ root
///                                         │
///        ensure_balance ◀─────────────────┘
///              │
///        issue_transaction (build, sign, verify, broadcast) ─▶ tx id
///              │
///        assemble proofs (leaf order == batch order)
/// ```
///
/// Any failure before broadcast aborts the whole batch with no chain
/// state changed.
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::anchor::bitcoin::{BitcoinSigner, BitcoinTransactionHandler};
use crate::anchor::broadcast::BroadcastCoordinator;
use crate::anchor::ethereum::{EthereumSigner, EthereumTransactionHandler};
use crate::anchor::mock::MockTransactionHandler;
use crate::anchor::providers::ProviderRegistry;
use crate::anchor::TransactionHandler;
use crate::chain::{BlockchainType, Chain};
use crate::config::IssuerConfig;
use crate::document::Batch;
use crate::error::{AnchorError, Result};
use crate::merkle::MerkleTree;
use crate::proof::{assemble, Proof};
use crate::signer::{ChainSigner, FileKeyMedium, HttpProbe, SecureSigner};

const ONLINE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a successful run. `proofs[i]` belongs to the i-th document.
#[derive(Debug, Clone)]
pub struct IssuedBatch {
    pub tx_id: String,
    pub root: [u8; 32],
    pub proofs: Vec<(String, Proof)>,
}

pub struct BatchIssuer {
    handler: Box<dyn TransactionHandler>,
}

impl BatchIssuer {
    pub fn new(handler: Box<dyn TransactionHandler>) -> Self {
        Self { handler }
    }

    /// Wire providers, signer and handler for the configured chain.
    pub fn from_config(config: &IssuerConfig, cancel: CancellationToken) -> Result<Self> {
        config.validate()?;
        let chain = config.chain;
        let provider_timeout = Duration::from_secs(config.broadcast.provider_timeout_secs);
        let broadcaster = || {
            BroadcastCoordinator::new(chain, config.broadcast.clone())
                .with_cancellation(cancel.clone())
        };

        let handler: Box<dyn TransactionHandler> = match chain.blockchain_type() {
            BlockchainType::Mock => Box::new(MockTransactionHandler),
            BlockchainType::Bitcoin => {
                let network = chain
                    .bitcoin_network()
                    .ok_or_else(|| AnchorError::Config(format!("{chain} has no bitcoin network")))?;
                let registry = ProviderRegistry::from_config(chain, &config.providers, provider_timeout)?;
                let signer = build_signer(config, Box::new(BitcoinSigner::new(network)), &cancel)?;
                let handler = BitcoinTransactionHandler::new(
                    chain,
                    &config.issuing_address,
                    config.bitcoin_costs,
                    &registry,
                    signer,
                    broadcaster(),
                )?
                .with_selection(config.selection.strategy())
                .with_payments(&config.payments)?;
                Box::new(handler)
            }
            BlockchainType::Ethereum => {
                let chain_id = chain
                    .ethereum_chain_id()
                    .ok_or_else(|| AnchorError::Config(format!("{chain} has no chain id")))?;
                let registry = ProviderRegistry::from_config(chain, &config.providers, provider_timeout)?;
                let signer = build_signer(config, Box::new(EthereumSigner::new(chain_id)), &cancel)?;
                Box::new(EthereumTransactionHandler::new(
                    chain,
                    &config.issuing_address,
                    config.ethereum_costs,
                    &registry,
                    signer,
                    broadcaster(),
                )?)
            }
        };

        info!(chain = %chain, address = %config.issuing_address, "Issuer configured");
        Ok(Self::new(handler))
    }

    pub fn chain(&self) -> Chain {
        self.handler.chain()
    }

    pub async fn issue(&mut self, batch: &Batch) -> Result<IssuedBatch> {
        if batch.is_empty() {
            return Err(AnchorError::EmptyBatch);
        }
        let chain = self.handler.chain();

        info!(chain = %chain, documents = batch.len(), "Issuing batch");
        let tree = MerkleTree::from_leaf_hashes(batch.leaf_hashes())?;
        let root = tree.root()?;
        info!(root = %hex::encode(root), "Merkle root computed");

        self.handler.ensure_balance().await?;
        let tx_id = self.handler.issue_transaction(&root).await?;
        info!(chain = %chain, tx_id = %tx_id, "Batch anchored");

        let proofs = batch
            .uids()
            .map(str::to_string)
            .zip(assemble(&tree, &tx_id, chain)?)
            .collect();

        Ok(IssuedBatch { tx_id, root, proofs })
    }
}

fn build_signer(
    config: &IssuerConfig,
    chain_signer: Box<dyn ChainSigner>,
    cancel: &CancellationToken,
) -> Result<SecureSigner> {
    let medium = Arc::new(FileKeyMedium::new(&config.key_file));
    let probe = Arc::new(HttpProbe::new(&config.online_check_url, ONLINE_CHECK_TIMEOUT)?);
    Ok(
        SecureSigner::new(chain_signer, medium, probe, config.safe_mode.clone())
            .with_cancellation(cancel.clone()),
    )
}
