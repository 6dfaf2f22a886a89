use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::chains::registry::ChainHandle;
use crate::watch::types::{StatsSnapshot, StreamEvent};

use super::price::PriceSource;

/// Emit a market snapshot for one chain on a fixed period, starting with an
/// immediate snapshot at subscription time.
///
/// The three sub-fetches run concurrently and fail independently; a snapshot
/// is emitted with whatever succeeded. A snapshot racing cancellation is
/// discarded, and teardown never waits for an in-flight fetch to finish.
pub async fn run_stats_poller(
    chain: Arc<ChainHandle>,
    prices: Arc<dyn PriceSource>,
    account: Option<Address>,
    period: Duration,
    out: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        chain = %chain.name,
        period_secs = period.as_secs(),
        account = account.is_some(),
        "Stats poller active"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = tokio::select! {
            _ = cancel.cancelled() => break,
            snapshot = collect_snapshot(&chain, prices.as_ref(), account) => snapshot,
        };

        // A snapshot that raced cancellation is discarded, not delivered.
        if cancel.is_cancelled() {
            break;
        }
        if out.send(StreamEvent::Stats(snapshot)).await.is_err() {
            break;
        }
    }

    tracing::info!(chain = %chain.name, "Stats poller stopped");
}

async fn collect_snapshot(
    chain: &ChainHandle,
    prices: &dyn PriceSource,
    account: Option<Address>,
) -> StatsSnapshot {
    let (price, gas, balance) = tokio::join!(
        prices.usd_price(&chain.price_asset_id),
        gas_price_gwei(chain),
        native_balance(chain, account),
    );
    StatsSnapshot::new(chain.chain_id, price, gas, balance)
}

async fn gas_price_gwei(chain: &ChainHandle) -> Option<f64> {
    match chain.client.gas_price().await {
        Ok(wei) => {
            let gwei = wei as f64 / 1e9;
            gwei.is_finite().then_some(gwei)
        }
        Err(err) => {
            tracing::warn!(chain = %chain.name, error = %err, "Gas price fetch failed");
            None
        }
    }
}

async fn native_balance(chain: &ChainHandle, account: Option<Address>) -> Option<f64> {
    let account = account?;
    match chain.client.native_balance(account).await {
        Ok(wei) => wei_to_native(wei),
        Err(err) => {
            tracing::warn!(chain = %chain.name, account = %account, error = %err, "Balance fetch failed");
            None
        }
    }
}

fn wei_to_native(wei: U256) -> Option<f64> {
    let value: f64 = wei.to_string().parse().ok()?;
    let native = value / 1e18;
    native.is_finite().then_some(native)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::testing::{mock_handle, MockChainClient};
    use crate::error::WatchError;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_WAIT: Duration = Duration::from_secs(1);

    struct StaticPrice(Option<f64>);

    #[async_trait]
    impl PriceSource for StaticPrice {
        async fn usd_price(&self, _asset_id: &str) -> Option<f64> {
            self.0
        }
    }

    async fn next_snapshot(rx: &mut mpsc::Receiver<StreamEvent>) -> StatsSnapshot {
        match timeout(RECV_WAIT, rx.recv())
            .await
            .expect("timed out waiting for snapshot")
            .expect("snapshot channel closed")
        {
            StreamEvent::Stats(snapshot) => snapshot,
            other => panic!("expected stats snapshot, got {other:?}"),
        }
    }

    #[test]
    fn test_wei_to_native_scales_to_units() {
        let two_eth = U256::from(2_000_000_000_000_000_000u128);
        assert_eq!(wei_to_native(two_eth), Some(2.0));
        assert_eq!(wei_to_native(U256::ZERO), Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_snapshot_is_immediate() {
        let chain = mock_handle(1, "Ethereum", MockChainClient::new());
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(run_stats_poller(
            chain,
            Arc::new(StaticPrice(Some(3400.0))),
            Some(Address::repeat_byte(0x11)),
            Duration::from_secs(30),
            out_tx,
            cancel.clone(),
        ));

        let snapshot = next_snapshot(&mut out_rx).await;
        assert_eq!(snapshot.chain_id, 1);
        assert_eq!(snapshot.eth_price_usd, Some(3400.0));
        assert_eq!(snapshot.gas_price_gwei, Some(25.0));
        assert_eq!(snapshot.native_token_balance, Some(2.0));

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_failure_still_emits_snapshot() {
        // Price unavailable, gas and balance fine: the snapshot carries the
        // two good fields and null for the price.
        let chain = mock_handle(1, "Ethereum", MockChainClient::new());
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(run_stats_poller(
            chain,
            Arc::new(StaticPrice(None)),
            Some(Address::repeat_byte(0x11)),
            Duration::from_secs(30),
            out_tx,
            cancel.clone(),
        ));

        let snapshot = next_snapshot(&mut out_rx).await;
        assert_eq!(snapshot.eth_price_usd, None);
        assert_eq!(snapshot.gas_price_gwei, Some(25.0));
        assert_eq!(snapshot.native_token_balance, Some(2.0));

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_failure_does_not_withhold_snapshot() {
        let client =
            MockChainClient::new().with_gas_price(Err(WatchError::Transport("rpc down".into())));
        let chain = mock_handle(1, "Ethereum", client);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(run_stats_poller(
            chain,
            Arc::new(StaticPrice(Some(3400.0))),
            None,
            Duration::from_secs(30),
            out_tx,
            cancel.clone(),
        ));

        let snapshot = next_snapshot(&mut out_rx).await;
        assert_eq!(snapshot.eth_price_usd, Some(3400.0));
        assert_eq!(snapshot.gas_price_gwei, None);
        // No account configured: balance is null, not an error.
        assert_eq!(snapshot.native_token_balance, None);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_failure_yields_null_balance_only() {
        let client =
            MockChainClient::new().with_balance(Err(WatchError::Transport("rpc down".into())));
        let chain = mock_handle(1, "Ethereum", client);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        tokio::spawn(run_stats_poller(
            chain,
            Arc::new(StaticPrice(Some(3400.0))),
            Some(Address::repeat_byte(0x11)),
            Duration::from_secs(30),
            out_tx,
            cancel.clone(),
        ));

        let snapshot = next_snapshot(&mut out_rx).await;
        assert_eq!(snapshot.eth_price_usd, Some(3400.0));
        assert_eq!(snapshot.gas_price_gwei, Some(25.0));
        assert_eq!(snapshot.native_token_balance, None);

        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_emission_and_cancellation() {
        let chain = mock_handle(1, "Ethereum", MockChainClient::new());
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_stats_poller(
            chain,
            Arc::new(StaticPrice(Some(1.0))),
            None,
            Duration::from_secs(30),
            out_tx,
            cancel.clone(),
        ));

        let _first = next_snapshot(&mut out_rx).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        let _second = next_snapshot(&mut out_rx).await;

        cancel.cancel();
        cancel.cancel(); // idempotent
        task.await.unwrap();

        // After cancellation the channel closes without further snapshots.
        assert!(out_rx.recv().await.is_none());
    }
}
