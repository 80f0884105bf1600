/// Network providers: funding connectors, nonce sources and broadcast
/// endpoints, and the registry that wires them to a chain.
pub mod blockcypher;
pub mod esplora;
pub mod eth_rpc;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::broadcast::BroadcastProvider;
use crate::chain::{BlockchainType, Chain};
use crate::error::{AnchorError, Result};
use crate::funding::{FundingConnector, NonceSource};

pub use blockcypher::BlockcypherClient;
pub use esplora::EsploraClient;
pub use eth_rpc::EthereumRpcClient;

/// One configured provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Esplora REST API (blockstream.info, mempool.space, self-hosted).
    Esplora { url: String },
    Blockcypher {
        url: String,
        #[serde(default)]
        token: Option<String>,
    },
    EthereumRpc { url: String },
}

impl ProviderConfig {
    fn blockchain_type(&self) -> BlockchainType {
        match self {
            ProviderConfig::Esplora { .. } | ProviderConfig::Blockcypher { .. } => {
                BlockchainType::Bitcoin
            }
            ProviderConfig::EthereumRpc { .. } => BlockchainType::Ethereum,
        }
    }
}

/// The providers available to one chain handler.
///
/// Every provider broadcasts. The first provider able to list funds
/// becomes the funding connector, and for account-model chains also the
/// nonce source.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    broadcasters: Vec<Arc<dyn BroadcastProvider>>,
    connector: Option<Arc<dyn FundingConnector>>,
    nonce_source: Option<Arc<dyn NonceSource>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(chain: Chain, configs: &[ProviderConfig], timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnchorError::Config(format!("cannot build HTTP client: {e}")))?;

        let mut registry = Self::new();
        for config in configs {
            if config.blockchain_type() != chain.blockchain_type() {
                return Err(AnchorError::Config(format!(
                    "provider {config:?} cannot serve {chain}"
                )));
            }

            match config {
                ProviderConfig::Esplora { url } => {
                    let esplora = Arc::new(EsploraClient::new(client.clone(), url, chain)?);
                    if registry.connector.is_none() {
                        registry.connector = Some(esplora.clone() as Arc<dyn FundingConnector>);
                    }
                    registry.broadcasters.push(esplora);
                }
                ProviderConfig::Blockcypher { url, token } => {
                    registry.broadcasters.push(Arc::new(BlockcypherClient::new(
                        client.clone(),
                        url,
                        token.clone(),
                    )));
                }
                ProviderConfig::EthereumRpc { url } => {
                    let rpc = Arc::new(EthereumRpcClient::new(client.clone(), url));
                    if registry.connector.is_none() {
                        registry.connector = Some(rpc.clone() as Arc<dyn FundingConnector>);
                        registry.nonce_source = Some(rpc.clone() as Arc<dyn NonceSource>);
                    }
                    registry.broadcasters.push(rpc);
                }
            }
        }
        Ok(registry)
    }

    pub fn with_broadcaster(mut self, provider: Arc<dyn BroadcastProvider>) -> Self {
        self.broadcasters.push(provider);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn FundingConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn with_nonce_source(mut self, nonces: Arc<dyn NonceSource>) -> Self {
        self.nonce_source = Some(nonces);
        self
    }

    pub fn broadcasters(&self) -> &[Arc<dyn BroadcastProvider>] {
        &self.broadcasters
    }

    pub fn connector(&self) -> Result<Arc<dyn FundingConnector>> {
        self.connector
            .clone()
            .ok_or_else(|| AnchorError::Config("no provider can supply funding information".into()))
    }

    pub fn nonce_source(&self) -> Result<Arc<dyn NonceSource>> {
        self.nonce_source
            .clone()
            .ok_or_else(|| AnchorError::Config("no provider can supply nonces".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_bitcoin_registry() {
        let configs = vec![
            ProviderConfig::Blockcypher {
                url: "https://api.blockcypher.com/v1/btc/test3".into(),
                token: None,
            },
            ProviderConfig::Esplora {
                url: "https://blockstream.info/testnet/api".into(),
            },
        ];
        let registry = ProviderRegistry::from_config(Chain::BitcoinTestnet, &configs, TIMEOUT).unwrap();

        let names: Vec<&str> = registry.broadcasters().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["blockcypher", "esplora"]);
        assert_eq!(registry.connector().unwrap().name(), "esplora");
        assert!(registry.nonce_source().is_err());
    }

    #[test]
    fn test_ethereum_registry() {
        let configs = vec![ProviderConfig::EthereumRpc {
            url: "http://localhost:8545".into(),
        }];
        let registry = ProviderRegistry::from_config(Chain::EthereumSepolia, &configs, TIMEOUT).unwrap();
        assert_eq!(registry.broadcasters().len(), 1);
        assert!(registry.connector().is_ok());
        assert!(registry.nonce_source().is_ok());
    }

    #[test]
    fn test_provider_must_match_chain() {
        let configs = vec![ProviderConfig::EthereumRpc {
            url: "http://localhost:8545".into(),
        }];
        assert!(matches!(
            ProviderRegistry::from_config(Chain::BitcoinMainnet, &configs, TIMEOUT),
            Err(AnchorError::Config(_))
        ));
    }

    #[test]
    fn test_provider_config_json() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"kind": "esplora", "url": "https://mempool.space/api"}"#).unwrap();
        assert_eq!(
            config,
            ProviderConfig::Esplora {
                url: "https://mempool.space/api".into()
            }
        );
    }
}
