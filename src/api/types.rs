use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

// ============================================================
// Query params
// ============================================================

#[derive(Debug, Deserialize)]
pub struct TrackerParams {
    /// "contracts" (default) or "stats".
    #[serde(rename = "type")]
    pub mode: Option<String>,
    /// Stats mode only; kept as a raw string so a malformed value defaults
    /// instead of rejecting the request.
    #[serde(rename = "chainId")]
    pub chain_id: Option<String>,
    pub address: Option<String>,
}

impl TrackerParams {
    pub fn parsed_chain_id(&self) -> Option<u64> {
        self.chain_id.as_deref().and_then(|raw| raw.parse().ok())
    }
}

/// A session account must be a 0x-prefixed 40-hex-char address; anything
/// else means "no account", never an error.
pub fn parse_account_address(raw: Option<&str>) -> Option<Address> {
    let raw = raw?;
    let digits = raw.strip_prefix("0x")?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    raw.parse().ok()
}

// ============================================================
// Response types
// ============================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub chains: Vec<ChainStatus>,
}

#[derive(Debug, Serialize)]
pub struct ChainStatus {
    pub chain_id: u64,
    pub name: String,
    pub token_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_address_accepts_valid() {
        let parsed =
            parse_account_address(Some("0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D")).unwrap();
        assert_eq!(
            parsed,
            "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
                .parse::<Address>()
                .unwrap()
        );
    }

    #[test]
    fn test_parse_account_address_rejects_malformed() {
        assert!(parse_account_address(None).is_none());
        assert!(parse_account_address(Some("")).is_none());
        // missing prefix
        assert!(parse_account_address(Some(
            "7a250d5630B4cF539739dF2C5dAcb4c659F2488D"
        ))
        .is_none());
        // too short
        assert!(parse_account_address(Some("0x7a250d")).is_none());
        // non-hex character
        assert!(parse_account_address(Some(
            "0xZa250d5630B4cF539739dF2C5dAcb4c659F2488D"
        ))
        .is_none());
    }

    #[test]
    fn test_parsed_chain_id_defaults_on_garbage() {
        let params = TrackerParams {
            mode: None,
            chain_id: Some("not-a-number".to_string()),
            address: None,
        };
        assert_eq!(params.parsed_chain_id(), None);

        let params = TrackerParams {
            mode: None,
            chain_id: Some("56".to_string()),
            address: None,
        };
        assert_eq!(params.parsed_chain_id(), Some(56));
    }
}
