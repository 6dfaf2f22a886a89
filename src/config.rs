use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    pub chains: Vec<ChainConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Per-session bound on buffered outbound events; a slow client applies
    /// backpressure through this channel rather than growing memory.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Deployed addresses whose lowercase hex ends with any of these suffixes
    /// are dropped before reaching clients.
    #[serde(default)]
    pub exclude_address_suffixes: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
            exclude_address_suffixes: Vec::new(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_http: String,
    pub rpc_ws: Option<String>,
    /// Fallback polling cadence when no WebSocket endpoint is configured.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    pub native_symbol: String,
    /// Asset identifier understood by the price oracle (e.g. "ethereum").
    pub price_asset_id: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// V2-style swap router used by the trade executor.
    pub router: String,
    pub wrapped_native: String,
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_token_type() -> String {
    "ERC20".to_string()
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            return Err(eyre::eyre!("At least one chain must be configured"));
        }
        let mut seen_ids = HashSet::new();
        for chain in &self.chains {
            if !seen_ids.insert(chain.chain_id) {
                return Err(eyre::eyre!(
                    "Duplicate chain_id {} for chain '{}'",
                    chain.chain_id,
                    chain.name
                ));
            }
            for (label, address) in [
                ("router", &chain.router),
                ("wrapped_native", &chain.wrapped_native),
            ] {
                if !address.starts_with("0x") || address.len() != 42 {
                    return Err(eyre::eyre!(
                        "Invalid {} address '{}' on chain '{}'",
                        label,
                        address,
                        chain.name
                    ));
                }
            }
        }
        Ok(())
    }
}
