/// Ethereum JSON-RPC client: balance, nonce and raw transaction submission.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::anchor::broadcast::BroadcastProvider;
use crate::anchor::SignedTransaction;
use crate::error::{AnchorError, Result};
use crate::funding::{Amount, FundingConnector, FundingInput, NonceSource};

const NAME: &str = "ethereum-rpc";

/// Simplified JSON-RPC response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

pub struct EthereumRpcClient {
    client: Client,
    rpc_url: String,
}

impl EthereumRpcClient {
    pub fn new(client: Client, rpc_url: &str) -> Self {
        Self {
            client,
            rpc_url: rpc_url.to_string(),
        }
    }

    /// Send a JSON-RPC request to the Ethereum node.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AnchorError::provider(NAME, e))?
            .json()
            .await
            .map_err(|e| AnchorError::provider(NAME, format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AnchorError::provider(NAME, format!("{method}: {}", err.message)));
        }

        resp.result
            .ok_or_else(|| AnchorError::provider(NAME, format!("{method}: empty RPC response")))
    }
}

/// Parse a `0x`-prefixed hex quantity.
fn parse_quantity(quantity: &str) -> Result<u128> {
    let digits = quantity.strip_prefix("0x").unwrap_or(quantity);
    u128::from_str_radix(digits, 16)
        .map_err(|e| AnchorError::provider(NAME, format!("invalid quantity {quantity}: {e}")))
}

#[async_trait]
impl FundingConnector for EthereumRpcClient {
    fn name(&self) -> &str {
        NAME
    }

    /// Account-model chain: no discrete inputs.
    async fn spendable_inputs(&self, _address: &str) -> Result<Vec<FundingInput>> {
        Ok(Vec::new())
    }

    async fn balance(&self, address: &str) -> Result<Amount> {
        let balance: String = self
            .rpc_call("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;
        parse_quantity(&balance)
    }
}

#[async_trait]
impl NonceSource for EthereumRpcClient {
    async fn nonce(&self, address: &str) -> Result<u64> {
        let count: String = self
            .rpc_call("eth_getTransactionCount", serde_json::json!([address, "pending"]))
            .await?;
        u64::try_from(parse_quantity(&count)?)
            .map_err(|e| AnchorError::provider(NAME, format!("nonce out of range: {e}")))
    }
}

#[async_trait]
impl BroadcastProvider for EthereumRpcClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn broadcast_tx(&self, tx: &SignedTransaction) -> Result<String> {
        let raw_hex = format!("0x{}", tx.to_hex());
        self.rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
    }
}
