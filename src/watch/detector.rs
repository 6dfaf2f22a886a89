use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use alloy::primitives::Address;

use crate::chains::registry::ChainHandle;
use crate::chains::types::ChainBlock;
use crate::error::WatchError;

use super::types::{ContractCreationEvent, InlineError, StreamEvent};

/// Per-subscription scan state: enforces non-decreasing block numbers and
/// at-most-once emission per (address, block) under duplicate notifications.
#[derive(Default)]
struct ScanState {
    last_block: Option<u64>,
    emitted: HashSet<Address>,
}

/// Watch one chain's block feed for token deployments.
///
/// Runs until cancelled, until the output channel closes, or until the block
/// feed terminates. Per-transaction failures are reported inline and never
/// stop the scan. Returns `Err` only when the initial subscription fails, so
/// the caller can decide what a dead chain means for its siblings.
pub async fn run_creation_detector(
    chain: Arc<ChainHandle>,
    events: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let mut sub = chain.client.subscribe_blocks().await?;
    tracing::info!(chain = %chain.name, "Contract creation watch active");

    let mut scan = ScanState::default();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = sub.next() => match item {
                Some(Ok(block)) => {
                    // Abort a half-scanned block on cancellation rather than
                    // waiting out its remaining receipt/metadata calls.
                    let keep_going = tokio::select! {
                        _ = cancel.cancelled() => false,
                        open = scan_block(&chain, &events, &mut scan, block) => open,
                    };
                    if !keep_going {
                        break;
                    }
                }
                Some(Err(err)) => {
                    let terminal = matches!(err, WatchError::SubscriptionTerminated(_));
                    if terminal {
                        tracing::warn!(chain = %chain.name, error = %err, "Block feed ended");
                    } else {
                        tracing::warn!(chain = %chain.name, error = %err, "Block feed error");
                    }
                    if send_inline_error(&events, &chain, &err).await.is_err() || terminal {
                        break;
                    }
                }
                None => {
                    let err = WatchError::terminated("block feed closed");
                    tracing::warn!(chain = %chain.name, "Block feed closed");
                    let _ = send_inline_error(&events, &chain, &err).await;
                    break;
                }
            }
        }
    }

    sub.cancel();
    tracing::info!(chain = %chain.name, "Contract creation watch stopped");
    Ok(())
}

/// Scan one block for creation transactions. Returns false once the output
/// channel is closed (session gone), which stops the detector.
async fn scan_block(
    chain: &ChainHandle,
    events: &mpsc::Sender<StreamEvent>,
    scan: &mut ScanState,
    block: ChainBlock,
) -> bool {
    match scan.last_block {
        Some(last) if block.number < last => {
            tracing::debug!(
                chain = %chain.name,
                block = block.number,
                last,
                "Skipping stale block notification"
            );
            return true;
        }
        Some(last) if block.number > last => scan.emitted.clear(),
        _ => {}
    }
    scan.last_block = Some(block.number);

    for tx in &block.transactions {
        if tx.to.is_some() {
            continue;
        }

        let receipt = match chain.client.transaction_receipt(tx.hash).await {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                tracing::debug!(chain = %chain.name, tx = %tx.hash, "No receipt for creation transaction");
                continue;
            }
            Err(err) => {
                tracing::warn!(chain = %chain.name, tx = %tx.hash, error = %err, "Receipt lookup failed");
                if send_inline_error(events, chain, &err).await.is_err() {
                    return false;
                }
                continue;
            }
        };

        let Some(address) = receipt.contract_address else {
            continue;
        };
        if scan.emitted.contains(&address) {
            continue;
        }

        match chain.client.token_metadata(address).await {
            Ok(meta) => {
                scan.emitted.insert(address);
                let event = ContractCreationEvent {
                    address,
                    name: meta.name,
                    symbol: meta.symbol,
                    block_number: block.number,
                    chain_id: chain.chain_id,
                    chain_name: chain.name.clone(),
                    token_type: chain.token_type.clone(),
                    timestamp: Utc::now(),
                };
                tracing::info!(
                    chain = %chain.name,
                    block = block.number,
                    address = %address,
                    symbol = %event.symbol,
                    "Token deployment detected"
                );
                if events.send(StreamEvent::Creation(event)).await.is_err() {
                    return false;
                }
            }
            Err(WatchError::NotAToken(_)) => {
                tracing::debug!(chain = %chain.name, address = %address, "Contract is not a fungible token");
            }
            Err(err) => {
                tracing::warn!(chain = %chain.name, address = %address, error = %err, "Metadata probe failed");
                if send_inline_error(events, chain, &err).await.is_err() {
                    return false;
                }
            }
        }
    }

    true
}

async fn send_inline_error(
    events: &mpsc::Sender<StreamEvent>,
    chain: &ChainHandle,
    err: &WatchError,
) -> Result<(), mpsc::error::SendError<StreamEvent>> {
    events
        .send(StreamEvent::Error(InlineError {
            error: err.to_string(),
            chain: chain.name.clone(),
        }))
        .await
}
