use alloy::consensus::Transaction;
use alloy::network::TransactionResponse;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy::rpc::types::{Block, BlockNumberOrTag};
use alloy::sol;
use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ChainConfig;
use crate::error::WatchError;

use super::types::{ChainBlock, ReceiptSummary, TokenMetadata, TxSummary};

sol! {
    #[sol(rpc)]
    interface IErc20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

/// Buffered blocks between the transport pump and the detector. A slow
/// detector applies backpressure to the pump through this bound.
const BLOCK_BUFFER: usize = 64;

/// One chain's logical capability set. Hides whether blocks arrive over a
/// persistent socket or HTTP polling, and which transport serves on-demand
/// reads.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Start a cancellable block subscription. Blocks are delivered in the
    /// order the transport observes them; transient fetch failures arrive as
    /// `Err` items without ending the feed, `SubscriptionTerminated` ends it.
    async fn subscribe_blocks(&self) -> Result<BlockSubscription, WatchError>;

    /// `Ok(None)` means the node does not (yet) know the receipt.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptSummary>, WatchError>;

    /// Probe a deployed contract for fungible-token metadata. Reverts, decode
    /// failures, and missing accessors are `NotAToken`; only network failures
    /// are `Transport`.
    async fn token_metadata(&self, address: Address) -> Result<TokenMetadata, WatchError>;

    async fn gas_price(&self) -> Result<u128, WatchError>;

    async fn native_balance(&self, address: Address) -> Result<U256, WatchError>;
}

/// Handle to a live block feed. Dropping it (or calling `cancel`) stops the
/// underlying pump task; cancellation is idempotent.
pub struct BlockSubscription {
    blocks: mpsc::Receiver<Result<ChainBlock, WatchError>>,
    cancel: CancellationToken,
}

impl BlockSubscription {
    pub(crate) fn new(
        blocks: mpsc::Receiver<Result<ChainBlock, WatchError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { blocks, cancel }
    }

    /// `None` once the feed has ended and all buffered items were drained.
    pub async fn next(&mut self) -> Option<Result<ChainBlock, WatchError>> {
        self.blocks.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for BlockSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Production adapter backed by alloy providers: an HTTP provider for
/// on-demand reads plus, when configured, a WebSocket endpoint for the block
/// feed (HTTP polling otherwise).
pub struct RpcChainClient {
    chain_name: String,
    http: DynProvider,
    ws_url: Option<String>,
    poll_interval: Duration,
}

impl RpcChainClient {
    pub fn from_config(config: &ChainConfig) -> eyre::Result<Self> {
        let url = config
            .rpc_http
            .parse()
            .map_err(|e| eyre::eyre!("Invalid RPC URL '{}': {}", config.rpc_http, e))?;
        let http = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            chain_name: config.name.clone(),
            http,
            ws_url: config.rpc_ws.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn subscribe_blocks(&self) -> Result<BlockSubscription, WatchError> {
        let (tx, rx) = mpsc::channel(BLOCK_BUFFER);
        let cancel = CancellationToken::new();

        if let Some(ws_url) = &self.ws_url {
            let ws = WsConnect::new(ws_url.clone());
            let provider = ProviderBuilder::new()
                .connect_ws(ws)
                .await
                .map_err(WatchError::transport)?
                .erased();
            let sub = provider
                .subscribe_blocks()
                .await
                .map_err(WatchError::transport)?;

            tracing::info!(chain = %self.chain_name, "WebSocket block subscription active");
            tokio::spawn(pump_ws_blocks(provider, sub, tx, cancel.clone()));
        } else {
            let start_block = retry_rpc(|| self.http.get_block_number())
                .await
                .map_err(WatchError::transport)?;

            tracing::info!(
                chain = %self.chain_name,
                poll_interval_ms = self.poll_interval.as_millis() as u64,
                start_block,
                "HTTP block polling active"
            );
            tokio::spawn(pump_polled_blocks(
                self.http.clone(),
                start_block,
                self.poll_interval,
                tx,
                cancel.clone(),
            ));
        }

        Ok(BlockSubscription::new(rx, cancel))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptSummary>, WatchError> {
        let receipt = self
            .http
            .get_transaction_receipt(hash)
            .await
            .map_err(WatchError::transport)?;

        Ok(receipt.map(|r| ReceiptSummary {
            contract_address: r.contract_address,
        }))
    }

    async fn token_metadata(&self, address: Address) -> Result<TokenMetadata, WatchError> {
        let token = IErc20Metadata::new(address, self.http.clone());
        let name_call = token.name();
        let symbol_call = token.symbol();
        let (name, symbol) = tokio::try_join!(name_call.call(), symbol_call.call())
            .map_err(|err| classify_call_error(address, err))?;

        Ok(TokenMetadata { name, symbol })
    }

    async fn gas_price(&self) -> Result<u128, WatchError> {
        self.http.get_gas_price().await.map_err(WatchError::transport)
    }

    async fn native_balance(&self, address: Address) -> Result<U256, WatchError> {
        self.http
            .get_balance(address)
            .await
            .map_err(WatchError::transport)
    }
}

/// Forward blocks from a WebSocket header subscription, hydrating each header
/// into a full block so the detector can see transaction recipients.
async fn pump_ws_blocks(
    provider: DynProvider,
    sub: alloy::pubsub::Subscription<alloy::rpc::types::Header>,
    tx: mpsc::Sender<Result<ChainBlock, WatchError>>,
    cancel: CancellationToken,
) {
    let mut stream = sub.into_stream();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            maybe_header = stream.next() => match maybe_header {
                Some(header) => {
                    let delivered = match fetch_full_block(&provider, header.number).await {
                        Ok(Some(block)) => tx.send(Ok(block)).await.is_ok(),
                        Ok(None) => {
                            tracing::debug!(block = header.number, "Announced block not yet available");
                            true
                        }
                        Err(err) => tx.send(Err(err)).await.is_ok(),
                    };
                    if !delivered {
                        break;
                    }
                }
                None => {
                    let _ = tx
                        .send(Err(WatchError::terminated("block feed closed by transport")))
                        .await;
                    break;
                }
            }
        }
    }
}

/// Poll for new block numbers and deliver every block in between, in order.
async fn pump_polled_blocks(
    provider: DynProvider,
    mut last_block: u64,
    poll_interval: Duration,
    tx: mpsc::Sender<Result<ChainBlock, WatchError>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.cancelled() => break,
        }

        let current = match retry_rpc(|| provider.get_block_number()).await {
            Ok(n) => n,
            Err(err) => {
                if tx.send(Err(WatchError::transport(err))).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if current <= last_block {
            continue;
        }

        for number in (last_block + 1)..=current {
            if cancel.is_cancelled() {
                return;
            }
            let delivered = match fetch_full_block(&provider, number).await {
                Ok(Some(block)) => tx.send(Ok(block)).await.is_ok(),
                Ok(None) => true,
                Err(err) => tx.send(Err(err)).await.is_ok(),
            };
            if !delivered {
                return;
            }
        }

        last_block = current;
    }
}

async fn fetch_full_block(
    provider: &DynProvider,
    number: u64,
) -> Result<Option<ChainBlock>, WatchError> {
    let block = retry_rpc(|| async {
        provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .full()
            .await
    })
    .await
    .map_err(WatchError::transport)?;

    Ok(block.map(to_chain_block))
}

fn to_chain_block(block: Block) -> ChainBlock {
    let transactions = block
        .transactions
        .txns()
        .map(|tx| TxSummary {
            hash: tx.tx_hash(),
            to: tx.to(),
        })
        .collect();

    ChainBlock {
        number: block.header.number,
        timestamp: block.header.timestamp,
        transactions,
    }
}

/// Most deployed contracts are not tokens: an execution revert or an
/// undecodable response is the expected `NotAToken` outcome, and only a
/// failure to reach the node is a transport error.
fn classify_call_error(address: Address, err: alloy::contract::Error) -> WatchError {
    match err {
        alloy::contract::Error::TransportError(rpc_err) => {
            if rpc_err.as_error_resp().is_some() {
                WatchError::NotAToken(address)
            } else {
                WatchError::Transport(rpc_err.to_string())
            }
        }
        _ => WatchError::NotAToken(address),
    }
}

/// Retry an async operation with exponential backoff.
/// Handles transient RPC errors (rate limits, network issues).
pub async fn retry_rpc<F, Fut, T, E>(mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = Duration::from_millis(500);
    let max_retries = 3;

    for attempt in 0..max_retries {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "RPC call failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(5));
            }
        }
    }

    f().await
}
