/// Esplora REST client (blockstream.info, mempool.space, self-hosted).
///
/// Serves as funding connector (confirmed UTXOs of the issuing address)
/// and as broadcast provider (`POST /tx` with the raw hex).
use async_trait::async_trait;
use bitcoin::{Network, ScriptBuf, Txid};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::anchor::bitcoin::parse_address;
use crate::anchor::broadcast::BroadcastProvider;
use crate::anchor::SignedTransaction;
use crate::chain::Chain;
use crate::error::{AnchorError, Result};
use crate::funding::{Amount, FundingConnector, FundingInput};

const NAME: &str = "esplora";

/// UTXO from API response.
#[derive(Debug, Deserialize)]
struct Utxo {
    txid: String,
    vout: u32,
    value: u64,
    status: UtxoStatus,
}

#[derive(Debug, Deserialize)]
struct UtxoStatus {
    confirmed: bool,
}

pub struct EsploraClient {
    client: Client,
    base_url: String,
    network: Network,
}

impl EsploraClient {
    pub fn new(client: Client, base_url: &str, chain: Chain) -> Result<Self> {
        let network = chain
            .bitcoin_network()
            .ok_or_else(|| AnchorError::Config(format!("esplora cannot serve {chain}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            network,
        })
    }
}

/// Confirmed UTXOs as funding inputs locked by `script_pubkey`.
fn confirmed_inputs(utxos: Vec<Utxo>, script_pubkey: &ScriptBuf) -> Result<Vec<FundingInput>> {
    utxos
        .into_iter()
        .filter(|u| u.status.confirmed)
        .map(|u| {
            let txid: Txid = u
                .txid
                .parse()
                .map_err(|e| AnchorError::provider(NAME, format!("invalid txid {}: {e}", u.txid)))?;
            Ok(FundingInput {
                txid,
                vout: u.vout,
                value: u.value,
                script_pubkey: script_pubkey.clone(),
            })
        })
        .collect()
}

#[async_trait]
impl FundingConnector for EsploraClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn spendable_inputs(&self, address: &str) -> Result<Vec<FundingInput>> {
        let script_pubkey = parse_address(address, self.network)?.script_pubkey();
        let utxos: Vec<Utxo> = self
            .client
            .get(format!("{}/address/{}/utxo", self.base_url, address))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AnchorError::provider(NAME, e))?
            .json()
            .await
            .map_err(|e| AnchorError::provider(NAME, format!("Failed to parse UTXOs: {e}")))?;

        debug!(address, utxos = utxos.len(), "Fetched UTXOs");
        confirmed_inputs(utxos, &script_pubkey)
    }

    async fn balance(&self, address: &str) -> Result<Amount> {
        let inputs = self.spendable_inputs(address).await?;
        Ok(inputs.iter().map(|i| Amount::from(i.value)).sum())
    }
}

#[async_trait]
impl BroadcastProvider for EsploraClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn broadcast_tx(&self, tx: &SignedTransaction) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/tx", self.base_url))
            .body(tx.to_hex())
            .send()
            .await
            .map_err(|e| AnchorError::provider(NAME, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::provider(NAME, format!("{status}: {body}")));
        }

        let txid = resp
            .text()
            .await
            .map_err(|e| AnchorError::provider(NAME, format!("Failed to read broadcast response: {e}")))?;
        Ok(txid.trim().to_string())
    }
}
