//! 选定路由的链上复核报价
//!
//! 链下估算只覆盖当前 tick 区间。提交前把每条拆分的 V3 段交给 QuoterV2
//! 重新报价，V2 段按刚读取的储备计算，滑点下限以复核后的数量为准。

use super::calldata::{encode_v3_path, segments};
use super::{PoolKind, SplitRoute, Trade, TradeRequest};
use crate::contracts::{self, QuoteExactInputCall, QuoteExactInputReturn};
use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use ethers::types::Address;
use futures::future::try_join_all;
use tracing::{info, instrument};

fn exhausted(split: &SplitRoute) -> TradingError {
    TradingError::NoRouteFound {
        token_in: format!("{:?}", split.route.tokens.first().copied().unwrap_or_default()),
        token_out: format!("{:?}", split.route.tokens.last().copied().unwrap_or_default()),
        max_hops: split.route.hops(),
    }
}

/// 沿拆分路径逐段链式报价
async fn requote_split(rpc: &dyn ChainRpc, quoter: Address, split: &SplitRoute) -> Result<SplitRoute> {
    let mut amount = split.amount_in;
    let mut hop = 0;
    for segment in segments(split) {
        let hops = segment.fees.len();
        if segment.constant_product {
            let pools = &split.route.pools[hop..hop + hops];
            for (pool, token) in pools.iter().zip(&split.route.tokens[hop..]) {
                amount = pool.quote(*token, amount).ok_or_else(|| exhausted(split))?;
            }
        } else {
            let quoted: QuoteExactInputReturn = contracts::read(
                rpc,
                quoter,
                QuoteExactInputCall {
                    path: encode_v3_path(&segment.tokens, &segment.fees),
                    amount_in: amount,
                },
            )
            .await?;
            amount = quoted.amount_out;
        }
        if amount.is_zero() {
            return Err(exhausted(split));
        }
        hop += hops;
    }

    Ok(SplitRoute {
        route: split.route.clone(),
        amount_in: split.amount_in,
        amount_out: amount,
    })
}

/// 用链上报价替换各拆分的估算输出并重新组装交易
///
/// 不含 V3 池的交易原样返回，不发起额外调用。
#[instrument(skip_all, fields(splits = trade.splits.len()))]
pub async fn requote_trade(
    rpc: &dyn ChainRpc,
    quoter: Address,
    request: &TradeRequest,
    trade: Trade,
) -> Result<Trade> {
    let has_concentrated = trade.splits.iter().any(|split| {
        split
            .route
            .pools
            .iter()
            .any(|pool| matches!(pool.kind, PoolKind::Concentrated { .. }))
    });
    if !has_concentrated {
        return Ok(trade);
    }

    let splits = try_join_all(
        trade
            .splits
            .iter()
            .map(|split| requote_split(rpc, quoter, split)),
    )
    .await?;
    let requoted = Trade::assemble(request, splits, trade.gas_cost)?;

    info!(
        estimated = %trade.expected_out,
        quoted = %requoted.expected_out,
        amount_out_minimum = %requoted.amount_out_minimum,
        "链上复核报价"
    );
    Ok(requoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{ExactInputCall, RouterMulticallCall, SwapExactTokensForTokensCall};
    use crate::pool_gateway::PoolGateway;
    use crate::position_math::{Slippage, mul_div};
    use crate::routing::{RouteSearchEngine, discover_candidates};
    use crate::testing::{MockChain, QUOTER, V2_FACTORY, V3_FACTORY, WBNB};
    use crate::tick_math;
    use ethers::abi::AbiDecode;
    use ethers::types::U256;
    use std::sync::Arc;

    fn request(token_in: Address, token_out: Address, amount_in: U256) -> TradeRequest {
        TradeRequest {
            token_in,
            token_out,
            amount_in,
            native_in: false,
            native_out: false,
            recipient: Address::repeat_byte(0x99),
            deadline: U256::from(1_700_000_000u64),
            slippage: Slippage::from_bps(50).unwrap(),
            gas_price: U256::zero(),
            wrapped_native: WBNB,
        }
    }

    async fn best_trade(chain: &Arc<MockChain>, request: &TradeRequest) -> Trade {
        let gateway = PoolGateway::new(chain.clone(), V2_FACTORY, V3_FACTORY);
        let candidates = discover_candidates(&gateway, request.token_in, request.token_out, &[WBNB], 4)
            .await
            .unwrap();
        RouteSearchEngine::default()
            .find_best_trade(request, &candidates)
            .unwrap()
    }

    fn exact_input_minimum(trade: &Trade) -> U256 {
        let multicall = RouterMulticallCall::decode(trade.calldata.as_ref()).unwrap();
        let exact = ExactInputCall::decode(multicall.data.last().unwrap().as_ref()).unwrap();
        exact.params.amount_out_minimum
    }

    #[tokio::test]
    async fn test_minimum_follows_onchain_quote() {
        let chain = MockChain::new();
        let a = chain.add_token("AAA", "Token A", 18);
        let b = chain.add_token("BBB", "Token B", 18);
        chain.add_v3_pool(a, b, 500, tick_math::sqrt_ratio_at_tick(0).unwrap(), 0, 10u128.pow(24));
        // 真实成交比单区间估算少 10%
        chain.set_quoter_ratio_bps(9_000);

        let req = request(a, b, U256::exp10(18));
        let estimated = best_trade(&chain, &req).await;
        let quoted = requote_trade(&*chain, QUOTER, &req, estimated.clone())
            .await
            .unwrap();

        assert_eq!(chain.quoter_calls(), 1);
        assert_eq!(
            quoted.expected_out,
            mul_div(estimated.expected_out, U256::from(9_000), U256::from(10_000)).unwrap()
        );
        assert_eq!(quoted.amount_out_minimum, req.slippage.min_amount(quoted.expected_out).unwrap());
        assert!(quoted.amount_out_minimum < estimated.amount_out_minimum);
        assert_eq!(exact_input_minimum(&quoted), quoted.amount_out_minimum);
        assert_eq!(quoted.gas_cost, estimated.gas_cost);
    }

    #[tokio::test]
    async fn test_mixed_route_feeds_v2_output_into_quoter() {
        let chain = MockChain::new();
        let a = chain.add_token("AAA", "Token A", 18);
        let b = chain.add_token("BBB", "Token B", 18);
        let deep = 10u128.pow(24);
        chain.add_v2_pair(a, WBNB, deep, deep);
        chain.add_v3_pool(WBNB, b, 500, tick_math::sqrt_ratio_at_tick(0).unwrap(), 0, deep);
        chain.set_quoter_ratio_bps(9_500);

        let req = request(a, b, U256::exp10(18));
        let estimated = best_trade(&chain, &req).await;
        assert_eq!(estimated.splits[0].route.tokens, vec![a, WBNB, b]);

        let quoted = requote_trade(&*chain, QUOTER, &req, estimated.clone())
            .await
            .unwrap();
        assert_eq!(chain.quoter_calls(), 1);
        assert_eq!(
            quoted.expected_out,
            mul_div(estimated.expected_out, U256::from(9_500), U256::from(10_000)).unwrap()
        );
    }

    #[tokio::test]
    async fn test_v2_only_trade_skips_quoter() {
        let chain = MockChain::new();
        let a = chain.add_token("AAA", "Token A", 18);
        let b = chain.add_token("BBB", "Token B", 18);
        chain.add_v2_pair(a, b, 10u128.pow(24), 10u128.pow(24));

        let req = request(a, b, U256::exp10(18));
        let estimated = best_trade(&chain, &req).await;
        let quoted = requote_trade(&*chain, QUOTER, &req, estimated.clone())
            .await
            .unwrap();

        assert_eq!(chain.quoter_calls(), 0);
        assert_eq!(quoted.expected_out, estimated.expected_out);
        let multicall = RouterMulticallCall::decode(quoted.calldata.as_ref()).unwrap();
        assert!(SwapExactTokensForTokensCall::decode(multicall.data[0].as_ref()).is_ok());
    }

    #[tokio::test]
    async fn test_quoter_failure_is_reported() {
        let chain = MockChain::new();
        let a = chain.add_token("AAA", "Token A", 18);
        let b = chain.add_token("BBB", "Token B", 18);
        chain.add_v3_pool(a, b, 500, tick_math::sqrt_ratio_at_tick(0).unwrap(), 0, 10u128.pow(24));

        let req = request(a, b, U256::exp10(18));
        let estimated = best_trade(&chain, &req).await;
        // 指向一个不是 QuoterV2 的地址
        let result = requote_trade(&*chain, Address::repeat_byte(0x01), &req, estimated).await;
        assert!(matches!(result, Err(TradingError::Rpc(_))));
    }
}
