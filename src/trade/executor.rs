use alloy::primitives::{Address, B256, U256};
use alloy::providers::DynProvider;
use alloy::sol;
use chrono::Utc;

use crate::error::WatchError;

sol! {
    #[sol(rpc)]
    interface IUniswapV2Router {
        function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) external payable returns (uint256[] amounts);
        function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) external returns (uint256[] amounts);
    }

    #[sol(rpc)]
    interface IErc20Approval {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 value) external returns (bool);
    }
}

/// Swaps are given this long to land before the router rejects them.
const DEADLINE_SECS: u64 = 600;

/// Minimum-output policy for a swap.
///
/// `AcceptAnyOutput` performs the swap with no slippage protection at all:
/// the router may fill at any price. Callers wanting protection must pass an
/// explicit `MinimumOut`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TradePolicy {
    #[default]
    AcceptAnyOutput,
    MinimumOut(U256),
}

impl TradePolicy {
    pub fn amount_out_min(&self) -> U256 {
        match self {
            Self::AcceptAnyOutput => U256::ZERO,
            Self::MinimumOut(min) => *min,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeOutcome {
    pub tx_hash: B256,
}

/// Collaborator that swaps between the native asset and a token through a
/// V2-style router. Signing is delegated to the node behind the provider.
pub struct TradeExecutor {
    provider: DynProvider,
    router: Address,
    wrapped_native: Address,
    policy: TradePolicy,
}

impl TradeExecutor {
    pub fn new(
        provider: DynProvider,
        router: Address,
        wrapped_native: Address,
        policy: TradePolicy,
    ) -> Self {
        Self {
            provider,
            router,
            wrapped_native,
            policy,
        }
    }

    /// Swap `native_amount` of the chain's native asset into `token`.
    pub async fn buy(
        &self,
        token: Address,
        native_amount: U256,
        account: Address,
    ) -> Result<TradeOutcome, WatchError> {
        if native_amount.is_zero() {
            return Err(WatchError::InvalidInput(
                "buy amount must be non-zero".to_string(),
            ));
        }

        let router = IUniswapV2Router::new(self.router, self.provider.clone());
        let pending = router
            .swapExactETHForTokens(
                self.policy.amount_out_min(),
                buy_path(self.wrapped_native, token),
                account,
                swap_deadline(),
            )
            .from(account)
            .value(native_amount)
            .send()
            .await
            .map_err(WatchError::transport)?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(%token, %account, %tx_hash, "Buy submitted");
        Ok(TradeOutcome { tx_hash })
    }

    /// Swap `token_amount` (raw token units) back into the native asset,
    /// approving the router first when the current allowance is short.
    pub async fn sell(
        &self,
        token: Address,
        token_amount: U256,
        account: Address,
    ) -> Result<TradeOutcome, WatchError> {
        if token_amount.is_zero() {
            return Err(WatchError::InvalidInput(
                "sell amount must be non-zero".to_string(),
            ));
        }

        let erc20 = IErc20Approval::new(token, self.provider.clone());
        let allowance = erc20
            .allowance(account, self.router)
            .call()
            .await
            .map_err(WatchError::transport)?;

        if allowance < token_amount {
            let approval = erc20
                .approve(self.router, token_amount)
                .from(account)
                .send()
                .await
                .map_err(WatchError::transport)?;
            // The swap would revert against a pending approval.
            approval.watch().await.map_err(WatchError::transport)?;
            tracing::debug!(%token, %account, "Router allowance approved");
        }

        let router = IUniswapV2Router::new(self.router, self.provider.clone());
        let pending = router
            .swapExactTokensForETH(
                token_amount,
                self.policy.amount_out_min(),
                sell_path(token, self.wrapped_native),
                account,
                swap_deadline(),
            )
            .from(account)
            .send()
            .await
            .map_err(WatchError::transport)?;

        let tx_hash = *pending.tx_hash();
        tracing::info!(%token, %account, %tx_hash, "Sell submitted");
        Ok(TradeOutcome { tx_hash })
    }
}

fn buy_path(wrapped_native: Address, token: Address) -> Vec<Address> {
    vec![wrapped_native, token]
}

fn sell_path(token: Address, wrapped_native: Address) -> Vec<Address> {
    vec![token, wrapped_native]
}

fn swap_deadline() -> U256 {
    U256::from(Utc::now().timestamp() as u64 + DEADLINE_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_accepts_any_output() {
        assert_eq!(TradePolicy::default(), TradePolicy::AcceptAnyOutput);
        assert_eq!(TradePolicy::AcceptAnyOutput.amount_out_min(), U256::ZERO);
        assert_eq!(
            TradePolicy::MinimumOut(U256::from(1234)).amount_out_min(),
            U256::from(1234)
        );
    }

    #[test]
    fn test_swap_paths_route_through_wrapped_native() {
        let wrapped = Address::repeat_byte(0x01);
        let token = Address::repeat_byte(0x02);
        assert_eq!(buy_path(wrapped, token), vec![wrapped, token]);
        assert_eq!(sell_path(token, wrapped), vec![token, wrapped]);
    }

    #[test]
    fn test_swap_deadline_is_in_the_future() {
        let now = U256::from(Utc::now().timestamp() as u64);
        assert!(swap_deadline() > now);
    }
}
