use alloy::primitives::Address;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;

use super::client::{ChainClient, RpcChainClient};

/// Immutable per-chain record built once at startup and shared by reference
/// into every detector and poller. Replaces per-chain conditional branching
/// with a lookup table keyed by chain id.
pub struct ChainHandle {
    pub chain_id: u64,
    pub name: String,
    pub native_symbol: String,
    pub price_asset_id: String,
    pub token_type: String,
    pub router: Address,
    pub wrapped_native: Address,
    pub client: Arc<dyn ChainClient>,
}

/// All configured chains; the first configured chain is the primary default.
pub struct ChainRegistry {
    ordered: Vec<Arc<ChainHandle>>,
    by_id: HashMap<u64, Arc<ChainHandle>>,
}

impl ChainRegistry {
    pub fn new(handles: Vec<Arc<ChainHandle>>) -> eyre::Result<Self> {
        if handles.is_empty() {
            return Err(eyre::eyre!("Chain registry requires at least one chain"));
        }
        let mut by_id = HashMap::with_capacity(handles.len());
        for handle in &handles {
            if by_id.insert(handle.chain_id, handle.clone()).is_some() {
                return Err(eyre::eyre!("Duplicate chain_id {}", handle.chain_id));
            }
        }
        Ok(Self {
            ordered: handles,
            by_id,
        })
    }

    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let mut handles = Vec::with_capacity(config.chains.len());
        for chain in &config.chains {
            let router = Address::from_str(&chain.router)
                .map_err(|e| eyre::eyre!("Invalid router address '{}': {}", chain.router, e))?;
            let wrapped_native = Address::from_str(&chain.wrapped_native).map_err(|e| {
                eyre::eyre!(
                    "Invalid wrapped_native address '{}': {}",
                    chain.wrapped_native,
                    e
                )
            })?;
            let client = RpcChainClient::from_config(chain)?;

            tracing::info!(
                chain = %chain.name,
                chain_id = chain.chain_id,
                ws = chain.rpc_ws.is_some(),
                "Chain client ready"
            );

            handles.push(Arc::new(ChainHandle {
                chain_id: chain.chain_id,
                name: chain.name.clone(),
                native_symbol: chain.native_symbol.clone(),
                price_asset_id: chain.price_asset_id.clone(),
                token_type: chain.token_type.clone(),
                router,
                wrapped_native,
                client: Arc::new(client),
            }));
        }
        Self::new(handles)
    }

    pub fn get(&self, chain_id: u64) -> Option<Arc<ChainHandle>> {
        self.by_id.get(&chain_id).cloned()
    }

    /// The default chain for sessions that do not select one.
    pub fn primary(&self) -> Arc<ChainHandle> {
        self.ordered[0].clone()
    }

    pub fn all(&self) -> &[Arc<ChainHandle>] {
        &self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::testing::{mock_handle, MockChainClient};

    #[test]
    fn test_registry_rejects_empty() {
        assert!(ChainRegistry::new(vec![]).is_err());
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let a = mock_handle(1, "ethereum", MockChainClient::new());
        let b = mock_handle(1, "clone", MockChainClient::new());
        assert!(ChainRegistry::new(vec![a, b]).is_err());
    }

    #[test]
    fn test_primary_is_first_configured() {
        let a = mock_handle(1, "ethereum", MockChainClient::new());
        let b = mock_handle(56, "bsc", MockChainClient::new());
        let registry = ChainRegistry::new(vec![a, b]).unwrap();

        assert_eq!(registry.primary().chain_id, 1);
        assert_eq!(registry.get(56).unwrap().name, "bsc");
        assert!(registry.get(137).is_none());
        assert_eq!(registry.all().len(), 2);
    }
}
