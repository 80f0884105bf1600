/// Ethereum calldata anchoring.
///
/// The commitment is the calldata of a zero-value legacy transaction sent
/// to the burn address. Calldata is stored permanently on chain and is
/// cheaper than storage slots. Gas price and limit come from
/// configuration, so the maximum cost is known before building.
use std::sync::Arc;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use tracing::{debug, error, info};

use super::broadcast::{BroadcastCoordinator, BroadcastProvider};
use super::cost::EthereumCostConstants;
use super::providers::ProviderRegistry;
use super::verify::verify_transaction;
use super::{sign_in_session, SignedTransaction, TransactionHandler, UnsignedTransaction};
use crate::chain::Chain;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{AnchorError, Result};
use crate::funding::{FundingConnector, NonceSource};
use crate::signer::{ChainSigner, SecureSigner};

/// Nobody holds the key for this address.
pub const BURN_ADDRESS: &str = "0xdeaddeaddeaddeaddeaddeaddeaddeaddeaddead";

pub fn parse_address(address: &str) -> Result<Address> {
    address.parse::<Address>().map_err(|e| AnchorError::InvalidAddress {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

pub fn build_transaction(
    commitment: &[u8; 32],
    nonce: u64,
    costs: &EthereumCostConstants,
    to: Address,
    chain_id: u64,
) -> UnsignedTransaction {
    UnsignedTransaction::Ethereum(TxLegacy {
        chain_id: Some(chain_id),
        nonce,
        gas_price: costs.gas_price,
        gas_limit: costs.gas_limit,
        to: TxKind::Call(to),
        value: U256::ZERO,
        input: Bytes::copy_from_slice(commitment),
    })
}

/// Signs legacy transactions with a hex-encoded secp256k1 key.
#[derive(Debug, Clone, Copy)]
pub struct EthereumSigner {
    chain_id: u64,
}

impl EthereumSigner {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }
}

impl ChainSigner for EthereumSigner {
    fn name(&self) -> &'static str {
        "ethereum-legacy"
    }

    fn sign(&self, key: &SensitiveVec, tx: UnsignedTransaction) -> Result<SignedTransaction> {
        let UnsignedTransaction::Ethereum(tx) = tx else {
            return Err(AnchorError::Signing("not an ethereum transaction".into()));
        };
        if tx.chain_id != Some(self.chain_id) {
            return Err(AnchorError::Signing(format!(
                "transaction chain id {:?} does not match signer chain id {}",
                tx.chain_id, self.chain_id
            )));
        }

        let signer: PrivateKeySigner = key
            .as_str()?
            .parse()
            .map_err(|e| AnchorError::Signing(format!("Invalid ETH private key: {e}")))?;
        let signature = signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| AnchorError::Signing(format!("ETH signing failed: {e}")))?;

        Ok(SignedTransaction::Ethereum(TxEnvelope::Legacy(
            tx.into_signed(signature),
        )))
    }
}

pub struct EthereumTransactionHandler {
    chain: Chain,
    chain_id: u64,
    address: Address,
    to: Address,
    costs: EthereumCostConstants,
    connector: Arc<dyn FundingConnector>,
    nonces: Arc<dyn NonceSource>,
    signer: SecureSigner,
    broadcaster: BroadcastCoordinator,
    providers: Vec<Arc<dyn BroadcastProvider>>,
}

impl EthereumTransactionHandler {
    pub fn new(
        chain: Chain,
        issuing_address: &str,
        costs: EthereumCostConstants,
        registry: &ProviderRegistry,
        signer: SecureSigner,
        broadcaster: BroadcastCoordinator,
    ) -> Result<Self> {
        let chain_id = chain
            .ethereum_chain_id()
            .ok_or_else(|| AnchorError::Config(format!("{chain} is not an ethereum chain")))?;

        Ok(Self {
            chain,
            chain_id,
            address: parse_address(issuing_address)?,
            to: parse_address(BURN_ADDRESS)?,
            costs,
            connector: registry.connector()?,
            nonces: registry.nonce_source()?,
            signer,
            broadcaster,
            providers: registry.broadcasters().to_vec(),
        })
    }

    pub fn signer(&self) -> &SecureSigner {
        &self.signer
    }

    fn address_string(&self) -> String {
        format!("{:#x}", self.address)
    }
}

#[async_trait]
impl TransactionHandler for EthereumTransactionHandler {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn ensure_balance(&self) -> Result<()> {
        let address = self.address_string();
        let available = self.connector.balance(&address).await?;
        let required = self.costs.max_cost();

        if available < required {
            error!(address = %address, required, available, "Issuing address needs more funds to issue this batch");
            return Err(AnchorError::InsufficientFunds {
                address,
                required,
                available,
            });
        }
        info!(address = %address, available, required, "Issuing address balance is sufficient");
        Ok(())
    }

    async fn issue_transaction(&mut self, commitment: &[u8; 32]) -> Result<String> {
        let nonce = self.nonces.nonce(&self.address_string()).await?;
        let unsigned = build_transaction(commitment, nonce, &self.costs, self.to, self.chain_id);
        debug!(nonce, chain_id = self.chain_id, "Created unsigned transaction");

        let signed = sign_in_session(&mut self.signer, unsigned).await?;
        debug!(signed_tx = %signed.to_hex(), "Signed transaction");
        verify_transaction(&signed, commitment)?;
        self.broadcaster.broadcast(&signed, &self.providers).await
    }
}
