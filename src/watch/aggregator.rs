use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use alloy::primitives::Address;

use crate::chains::registry::ChainHandle;

use super::detector::run_creation_detector;
use super::types::{address_hex, InlineError, StreamEvent};

/// Global blocklist applied to deployed addresses before events reach any
/// client. Matching is a case-insensitive suffix match on the hex form.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    suffixes: Vec<String>,
}

impl ExclusionFilter {
    pub fn new(suffixes: impl IntoIterator<Item = String>) -> Self {
        Self {
            suffixes: suffixes.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn is_excluded(&self, address: &Address) -> bool {
        let hex = address_hex(address);
        self.suffixes.iter().any(|suffix| hex.ends_with(suffix))
    }
}

/// Run one creation detector per chain and merge their events onto `out`.
///
/// Events interleave across chains in arrival order; within one chain the
/// detector's block-number ordering is preserved. A chain that fails to
/// subscribe reports an inline error and does not stop its siblings.
/// Cancellation propagates to every detector, and the merge loop only
/// returns after all of them have stopped.
pub async fn run_aggregator(
    chains: Vec<Arc<ChainHandle>>,
    filter: ExclusionFilter,
    out: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let (inner_tx, mut inner_rx) = mpsc::channel(chains.len().max(1) * 16);

    let mut detectors = Vec::with_capacity(chains.len());
    for chain in chains {
        let events = inner_tx.clone();
        let child = cancel.child_token();
        let chain_name = chain.name.clone();
        detectors.push(tokio::spawn(async move {
            if let Err(err) = run_creation_detector(chain, events.clone(), child).await {
                tracing::warn!(chain = %chain_name, error = %err, "Failed to start creation watch");
                let _ = events
                    .send(StreamEvent::Error(InlineError {
                        error: err.to_string(),
                        chain: chain_name,
                    }))
                    .await;
            }
        }));
    }
    drop(inner_tx);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = inner_rx.recv() => match item {
                Some(event) => {
                    if let StreamEvent::Creation(ref creation) = event {
                        if filter.is_excluded(&creation.address) {
                            tracing::debug!(
                                chain = %creation.chain_name,
                                address = %creation.address,
                                "Deployment excluded by address blocklist"
                            );
                            continue;
                        }
                    }
                    if out.send(event).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }

    cancel.cancel();
    for detector in detectors {
        let _ = detector.await;
    }
    tracing::debug!("Aggregator stopped");
}
