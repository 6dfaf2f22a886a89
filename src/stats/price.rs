use async_trait::async_trait;
use serde_json::Value;

const COINGECKO_API: &str = "https://api.coingecko.com/api/v3";

/// Consumed price-oracle interface: a quote is either available or it is
/// not; an unavailable quote is never an error for the caller.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn usd_price(&self, asset_id: &str) -> Option<f64>;
}

/// CoinGecko-backed oracle. Asset ids come from chain configuration
/// (e.g. "ethereum", "binancecoin").
pub struct PriceOracle {
    http: reqwest::Client,
    base_url: String,
}

impl PriceOracle {
    pub fn new() -> Self {
        Self::with_base_url(COINGECKO_API.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }
}

impl Default for PriceOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for PriceOracle {
    async fn usd_price(&self, asset_id: &str) -> Option<f64> {
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, asset_id
        );

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(asset = asset_id, error = %err, "Price fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            tracing::warn!(asset = asset_id, status = %response.status(), "Price fetch rejected");
            return None;
        }

        let body: Value = response.json().await.ok()?;
        price_from_body(&body, asset_id)
    }
}

fn price_from_body(body: &Value, asset_id: &str) -> Option<f64> {
    body.get(asset_id)?.get("usd")?.as_f64()
}
