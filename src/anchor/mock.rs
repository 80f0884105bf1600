/// Mockchain: the full issuing flow without touching a blockchain.
///
/// Nothing is built, signed or broadcast. The returned transaction id is
/// a fixed marker so that proofs issued this way can never be mistaken
/// for real anchors.
use async_trait::async_trait;
use tracing::info;

use super::TransactionHandler;
use crate::chain::Chain;
use crate::error::Result;

pub const MOCK_TRANSACTION_ID: &str =
    "This has not been issued on a blockchain and is for testing only";

#[derive(Debug, Default)]
pub struct MockTransactionHandler;

#[async_trait]
impl TransactionHandler for MockTransactionHandler {
    fn chain(&self) -> Chain {
        Chain::Mockchain
    }

    async fn ensure_balance(&self) -> Result<()> {
        Ok(())
    }

    async fn issue_transaction(&mut self, commitment: &[u8; 32]) -> Result<String> {
        info!(root = %hex::encode(commitment), "Mockchain: skipping transaction");
        Ok(MOCK_TRANSACTION_ID.to_string())
    }
}
