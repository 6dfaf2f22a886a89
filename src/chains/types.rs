use alloy::primitives::{Address, B256};

/// Minimal view of a ledger block as seen by the creation detector.
/// Transient: fetched, scanned, discarded.
#[derive(Debug, Clone)]
pub struct ChainBlock {
    pub number: u64,
    pub timestamp: u64,
    pub transactions: Vec<TxSummary>,
}

/// A transaction within a block. A missing recipient marks a contract
/// creation transaction.
#[derive(Debug, Clone)]
pub struct TxSummary {
    pub hash: B256,
    pub to: Option<Address>,
}

/// The part of a transaction receipt the detector cares about.
#[derive(Debug, Clone)]
pub struct ReceiptSummary {
    pub contract_address: Option<Address>,
}

/// Result of a successful fungible-token metadata probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}
