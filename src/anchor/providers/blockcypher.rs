/// Blockcypher push API, broadcast only.
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::anchor::broadcast::BroadcastProvider;
use crate::anchor::SignedTransaction;
use crate::error::{AnchorError, Result};

const NAME: &str = "blockcypher";

#[derive(Debug, Deserialize)]
struct PushResponse {
    tx: PushedTx,
}

#[derive(Debug, Deserialize)]
struct PushedTx {
    hash: String,
}

pub struct BlockcypherClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl BlockcypherClient {
    pub fn new(client: Client, base_url: &str, token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl BroadcastProvider for BlockcypherClient {
    fn name(&self) -> &str {
        NAME
    }

    async fn broadcast_tx(&self, tx: &SignedTransaction) -> Result<String> {
        let mut request = self
            .client
            .post(format!("{}/txs/push", self.base_url))
            .json(&serde_json::json!({ "tx": tx.to_hex() }));
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }

        let resp = request.send().await.map_err(|e| AnchorError::provider(NAME, e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AnchorError::provider(NAME, format!("{status}: {body}")));
        }

        let pushed: PushResponse = resp
            .json()
            .await
            .map_err(|e| AnchorError::provider(NAME, format!("Failed to parse push response: {e}")))?;
        Ok(pushed.tx.hash)
    }
}
