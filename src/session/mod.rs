use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chains::registry::ChainRegistry;
use crate::config::{StatsConfig, StreamConfig};
use crate::stats::poller::run_stats_poller;
use crate::stats::price::PriceSource;
use crate::watch::aggregator::{run_aggregator, ExclusionFilter};
use crate::watch::types::StreamEvent;

/// What a client subscribes to: the merged multi-chain deployment feed, or
/// one chain's market snapshots. The two are separate sessions by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    Creations,
    Stats,
}

impl SessionMode {
    /// Anything other than an explicit "stats" keeps the deployment feed,
    /// matching the default-tolerant session parameters.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("stats") => Self::Stats,
            _ => Self::Creations,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub mode: SessionMode,
    /// Stats mode only; `None` or an unknown id falls back to the primary
    /// chain rather than failing the session.
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
}

/// Opens sessions and owns the shared collaborators they need.
pub struct SessionManager {
    registry: Arc<ChainRegistry>,
    prices: Arc<dyn PriceSource>,
    filter_suffixes: Vec<String>,
    event_buffer: usize,
    stats_period: Duration,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ChainRegistry>,
        prices: Arc<dyn PriceSource>,
        stream: &StreamConfig,
        stats: &StatsConfig,
    ) -> Self {
        Self {
            registry,
            prices,
            filter_suffixes: stream.exclude_address_suffixes.clone(),
            event_buffer: stream.event_buffer,
            stats_period: Duration::from_secs(stats.poll_interval_secs),
        }
    }

    /// Wire up one client's pipeline and hand back its event stream. All
    /// spawned work hangs off the session's cancellation token, so dropping
    /// the returned `Session` is a complete teardown.
    pub fn open(&self, request: SessionRequest) -> Session {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.event_buffer);

        match request.mode {
            SessionMode::Creations => {
                let chains = self.registry.all().to_vec();
                let filter = ExclusionFilter::new(self.filter_suffixes.iter().cloned());
                tokio::spawn(run_aggregator(chains, filter, tx, cancel.child_token()));
            }
            SessionMode::Stats => {
                let chain = request
                    .chain_id
                    .and_then(|id| self.registry.get(id))
                    .unwrap_or_else(|| self.registry.primary());
                tokio::spawn(run_stats_poller(
                    chain,
                    self.prices.clone(),
                    request.account,
                    self.stats_period,
                    tx,
                    cancel.child_token(),
                ));
            }
        }

        Session {
            events: rx,
            guard: SessionGuard { cancel },
        }
    }
}

/// One client's live subscription. The receiver drains already-produced
/// events; the guard tears everything down when the session goes away.
pub struct Session {
    events: mpsc::Receiver<StreamEvent>,
    guard: SessionGuard,
}

impl Session {
    /// `None` once the session has been torn down and the buffer is drained.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn shutdown(&self) {
        self.guard.shutdown();
    }
}

/// Owns the session's cancellation tree. Cancellation is idempotent, so the
/// explicit `shutdown` and the `Drop` teardown can both fire safely.
struct SessionGuard {
    cancel: CancellationToken,
}

impl SessionGuard {
    fn shutdown(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
