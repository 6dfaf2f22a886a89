use alloy::primitives::Address;
use thiserror::Error;

/// Failure taxonomy for the watching pipeline.
///
/// Only `Transport` and `SubscriptionTerminated` are surfaced to clients (as
/// inline error events); `NotAToken` is an expected probe outcome and is
/// filtered silently, and `InvalidInput` is defaulted at the session boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("no fungible token metadata at {0}")]
    NotAToken(Address),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("block subscription terminated: {0}")]
    SubscriptionTerminated(String),
}

impl WatchError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::SubscriptionTerminated(reason.into())
    }
}
