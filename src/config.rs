use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::anchor::broadcast::BroadcastSettings;
use crate::anchor::cost::{BitcoinCostConstants, EthereumCostConstants};
use crate::anchor::providers::ProviderConfig;
use crate::chain::{BlockchainType, Chain};
use crate::error::{AnchorError, Result};
use crate::funding::{PaymentOutput, SelectionKind};
use crate::signer::SafeModeSettings;

/// Issuer configuration, read from a JSON file.
///
/// Only `chain` and `issuing_address` are required; everything else has
/// working defaults for a Bitcoin issuer with a USB key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub chain: Chain,

    pub issuing_address: String,

    /// Written into each document proof's `verificationMethod`.
    #[serde(default)]
    pub verification_method: String,

    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,

    #[serde(default)]
    pub safe_mode: SafeModeSettings,

    /// Reachability of this URL decides whether the host is online.
    #[serde(default = "default_online_check_url")]
    pub online_check_url: String,

    #[serde(default)]
    pub bitcoin_costs: BitcoinCostConstants,

    #[serde(default)]
    pub ethereum_costs: EthereumCostConstants,

    /// Extra outputs paid by each Bitcoin anchoring transaction.
    #[serde(default)]
    pub payments: Vec<PaymentOutput>,

    #[serde(default)]
    pub broadcast: BroadcastSettings,

    #[serde(default)]
    pub selection: SelectionKind,

    /// Tried in order when broadcasting.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_key_file() -> PathBuf {
    PathBuf::from("/media/usb/pk_issuer.txt")
}

fn default_online_check_url() -> String {
    "https://www.google.com".to_string()
}

impl IssuerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.issuing_address.trim().is_empty() {
            return Err(AnchorError::Config("issuing_address must not be empty".into()));
        }
        if self.broadcast.max_attempts == 0 {
            return Err(AnchorError::Config("broadcast.max_attempts must be at least 1".into()));
        }
        if self.safe_mode.enabled && self.safe_mode.poll_interval_secs == 0 {
            return Err(AnchorError::Config(
                "safe_mode.poll_interval_secs must be at least 1".into(),
            ));
        }
        if self.chain.blockchain_type() != BlockchainType::Mock && self.providers.is_empty() {
            return Err(AnchorError::Config(format!(
                "no providers configured for {}",
                self.chain
            )));
        }
        Ok(())
    }
}
