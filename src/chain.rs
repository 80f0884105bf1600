/// Supported anchoring chains and their naming conventions.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Chain family; decides the transaction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockchainType {
    Bitcoin,
    Ethereum,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chain {
    BitcoinMainnet,
    BitcoinTestnet,
    BitcoinRegtest,
    BitcoinSignet,
    EthereumMainnet,
    EthereumSepolia,
    Mockchain,
}

impl Chain {
    pub fn blockchain_type(self) -> BlockchainType {
        match self {
            Chain::BitcoinMainnet
            | Chain::BitcoinTestnet
            | Chain::BitcoinRegtest
            | Chain::BitcoinSignet => BlockchainType::Bitcoin,
            Chain::EthereumMainnet | Chain::EthereumSepolia => BlockchainType::Ethereum,
            Chain::Mockchain => BlockchainType::Mock,
        }
    }

    /// Name written into proof anchors (e.g. `bitcoinMainnet`).
    pub fn display_name(self) -> &'static str {
        match self {
            Chain::BitcoinMainnet => "bitcoinMainnet",
            Chain::BitcoinTestnet => "bitcoinTestnet",
            Chain::BitcoinRegtest => "bitcoinRegtest",
            Chain::BitcoinSignet => "bitcoinSignet",
            Chain::EthereumMainnet => "ethereumMainnet",
            Chain::EthereumSepolia => "ethereumSepolia",
            Chain::Mockchain => "mockchain",
        }
    }

    /// Anchor type written into proof anchors.
    pub fn anchor_type(self) -> &'static str {
        match self.blockchain_type() {
            BlockchainType::Bitcoin => "BTCOpReturn",
            BlockchainType::Ethereum => "ETHData",
            BlockchainType::Mock => "Mock",
        }
    }

    pub fn bitcoin_network(self) -> Option<bitcoin::Network> {
        match self {
            Chain::BitcoinMainnet => Some(bitcoin::Network::Bitcoin),
            Chain::BitcoinTestnet => Some(bitcoin::Network::Testnet),
            Chain::BitcoinRegtest => Some(bitcoin::Network::Regtest),
            Chain::BitcoinSignet => Some(bitcoin::Network::Signet),
            _ => None,
        }
    }

    pub fn ethereum_chain_id(self) -> Option<u64> {
        match self {
            Chain::EthereumMainnet => Some(1),
            Chain::EthereumSepolia => Some(11_155_111),
            _ => None,
        }
    }

    /// Whether `tx_id` has the shape of a transaction id on this chain.
    ///
    /// Bitcoin ids are 64 hex characters; Ethereum hashes may carry a `0x`
    /// prefix. The mock chain accepts any non-empty id.
    pub fn is_valid_tx_id(self, tx_id: &str) -> bool {
        let digits = match self.blockchain_type() {
            BlockchainType::Bitcoin => tx_id,
            BlockchainType::Ethereum => tx_id.strip_prefix("0x").unwrap_or(tx_id),
            BlockchainType::Mock => return !tx_id.is_empty(),
        };
        digits.len() == 64 && digits.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// The one spelling of a valid transaction id that ids are compared in:
    /// lowercase hex, with a `0x` prefix on Ethereum.
    pub fn canonical_tx_id(self, tx_id: &str) -> String {
        match self.blockchain_type() {
            BlockchainType::Bitcoin => tx_id.to_ascii_lowercase(),
            BlockchainType::Ethereum => {
                let digits = tx_id.strip_prefix("0x").unwrap_or(tx_id);
                format!("0x{}", digits.to_ascii_lowercase())
            }
            BlockchainType::Mock => tx_id.to_string(),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
