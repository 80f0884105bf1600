/// Broadcasting a signed transaction through redundant providers.
///
/// Each round offers the transaction to every configured provider in
/// order. A round succeeds if at least one provider returns a valid
/// transaction id and all such ids agree. Rounds repeat, separated by
/// the retry interval, until one succeeds or the attempts run out.
///
/// ```text
/// round 1: provider A ✗   provider B ✓ id   provider C ✓ id   ─▶ id
/// round 1: provider A ✓ x provider B ✓ y                      ─▶ ConflictingResult
/// ```
///
/// Ids are compared in their canonical spelling (`Chain::canonical_tx_id`),
/// so `ABC…` and `abc…`, or `0xabc…` and `abc…` on Ethereum, agree.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::SignedTransaction;
use crate::chain::Chain;
use crate::clock::{sleep_or_cancel, Clock, TokioClock};
use crate::error::{AnchorError, Result};

#[async_trait]
pub trait BroadcastProvider: Send + Sync {
    /// Human-readable name of this provider (e.g., "esplora").
    fn name(&self) -> &str;

    /// Submit `tx` and return the transaction id the network assigned.
    async fn broadcast_tx(&self, tx: &SignedTransaction) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastSettings {
    pub max_attempts: u32,
    pub retry_interval_secs: u64,
    /// Upper bound on a single provider call.
    pub provider_timeout_secs: u64,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_interval_secs: 30,
            provider_timeout_secs: 60,
        }
    }
}

pub struct BroadcastCoordinator {
    chain: Chain,
    settings: BroadcastSettings,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl BroadcastCoordinator {
    pub fn new(chain: Chain, settings: BroadcastSettings) -> Self {
        Self {
            chain,
            settings,
            clock: Arc::new(TokioClock),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Broadcast `tx` and return the agreed transaction id.
    pub async fn broadcast(
        &self,
        tx: &SignedTransaction,
        providers: &[Arc<dyn BroadcastProvider>],
    ) -> Result<String> {
        if providers.is_empty() {
            return Err(AnchorError::Config("no broadcast providers configured".into()));
        }

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::from("no provider returned a transaction id");

        for attempt in 1..=max_attempts {
            info!(chain = %self.chain, attempt, max_attempts, "Broadcasting transaction");

            match self.broadcast_round(tx, providers).await? {
                Ok(tx_id) => {
                    info!(chain = %self.chain, tx_id = %tx_id, attempt, "Broadcast successful");
                    return Ok(tx_id);
                }
                Err(round_error) => last_error = round_error,
            }

            if attempt < max_attempts {
                warn!(
                    chain = %self.chain,
                    attempt,
                    retry_in_secs = self.settings.retry_interval_secs,
                    error = %last_error,
                    "Broadcast round failed; retrying"
                );
                sleep_or_cancel(
                    self.clock.as_ref(),
                    Duration::from_secs(self.settings.retry_interval_secs),
                    &self.cancel,
                    "waiting to retry broadcast",
                )
                .await?;
            }
        }

        error!(chain = %self.chain, attempts = max_attempts, error = %last_error, "Broadcast failed");
        Err(AnchorError::Broadcast {
            attempts: max_attempts,
            last_error,
        })
    }

    /// One pass over all providers. The outer error aborts broadcasting;
    /// the inner error is this round's failure description.
    async fn broadcast_round(
        &self,
        tx: &SignedTransaction,
        providers: &[Arc<dyn BroadcastProvider>],
    ) -> Result<std::result::Result<String, String>> {
        let mut agreed: Option<String> = None;
        let mut last_error = None;

        for provider in providers {
            let result = self.call_provider(provider.as_ref(), tx).await?;
            match result {
                Ok(tx_id) => {
                    if let Some(first) = &agreed {
                        if *first != tx_id {
                            error!(
                                first = %first,
                                second = %tx_id,
                                provider = provider.name(),
                                "Providers disagree on the transaction id"
                            );
                            return Err(AnchorError::ConflictingResult {
                                first: first.clone(),
                                second: tx_id,
                            });
                        }
                    } else {
                        agreed = Some(tx_id);
                    }
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Provider failed to broadcast");
                    last_error = Some(e.to_string());
                }
            }
        }

        Ok(agreed.ok_or_else(|| {
            last_error.unwrap_or_else(|| "no provider returned a transaction id".into())
        }))
    }

    /// Call one provider under the per-call timeout. Cancellation aborts
    /// the whole broadcast; every other failure is the provider's.
    async fn call_provider(
        &self,
        provider: &dyn BroadcastProvider,
        tx: &SignedTransaction,
    ) -> Result<Result<String>> {
        let timeout = Duration::from_secs(self.settings.provider_timeout_secs);
        let call = tokio::time::timeout(timeout, provider.broadcast_tx(tx));

        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(AnchorError::Cancelled("broadcasting transaction".into()));
            }
            outcome = call => outcome,
        };

        Ok(match outcome {
            Err(_) => Err(AnchorError::Timeout {
                during: format!("broadcasting via {}", provider.name()),
                secs: timeout.as_secs(),
            }),
            Ok(Ok(tx_id)) if !self.chain.is_valid_tx_id(&tx_id) => {
                Err(AnchorError::InvalidTransactionId {
                    provider: provider.name().to_string(),
                    tx_id,
                })
            }
            Ok(Ok(tx_id)) => Ok(self.chain.canonical_tx_id(&tx_id)),
            Ok(Err(e)) => Err(e),
        })
    }
}
