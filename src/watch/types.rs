use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================
// Hex helper
// ============================================================

pub fn address_hex(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

// ============================================================
// Wire events
// ============================================================

/// A validated token deployment, reported at most once per
/// (chain_id, address, block_number).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCreationEvent {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub block_number: u64,
    pub chain_id: u64,
    pub chain_name: String,
    pub token_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Periodic market snapshot. Fields are `null` when their sub-fetch failed;
/// the snapshot itself is always emitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    #[serde(rename = "type")]
    kind: &'static str,
    pub chain_id: u64,
    pub eth_price_usd: Option<f64>,
    pub gas_price_gwei: Option<f64>,
    pub native_token_balance: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn new(
        chain_id: u64,
        eth_price_usd: Option<f64>,
        gas_price_gwei: Option<f64>,
        native_token_balance: Option<f64>,
    ) -> Self {
        Self {
            kind: "stats",
            chain_id,
            eth_price_usd,
            gas_price_gwei,
            native_token_balance,
            timestamp: Utc::now(),
        }
    }
}

/// A per-chain failure reported inline on the stream; the stream itself
/// stays open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineError {
    pub error: String,
    pub chain: String,
}

/// Everything a session can push to its client. Untagged: creation events
/// are recognized by field shape, snapshots carry `type: "stats"`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StreamEvent {
    Creation(ContractCreationEvent),
    Stats(StatsSnapshot),
    Error(InlineError),
}
