//! SmartRouter multicall 编码
//!
//! 每条拆分路径按池子类型切成连续的段：V2 段走 swapExactTokensForTokens，
//! V3 段走 exactInput。同一路径的后续段以 0（合约余额）作为输入数量，
//! 中间产物留在路由合约内。

use super::{PoolKind, SplitRoute, TradeRequest};
use crate::contracts::{
    ExactInputCall, ExactInputParams, RouterMulticallCall, SwapExactTokensForTokensCall,
    UnwrapWeth9Call,
};
use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, H160, U256};

/// 路由合约自身（Constants.ADDRESS_THIS）
pub const ADDRESS_THIS: Address = H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2,
]);

/// 以合约当前余额作为输入（Constants.CONTRACT_BALANCE）
pub const CONTRACT_BALANCE: U256 = U256([0; 4]);

/// 同类型池子的连续片段
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Segment {
    pub(super) constant_product: bool,
    pub(super) tokens: Vec<Address>,
    pub(super) fees: Vec<u32>,
}

pub(super) fn segments(split: &SplitRoute) -> Vec<Segment> {
    let route = &split.route;
    let mut out: Vec<Segment> = Vec::new();
    for (i, pool) in route.pools.iter().enumerate() {
        let (constant_product, fee) = match pool.kind {
            PoolKind::ConstantProduct => (true, 0),
            PoolKind::Concentrated { fee_tier } => (false, fee_tier),
        };
        match out.last_mut() {
            Some(segment) if segment.constant_product == constant_product => {
                segment.tokens.push(route.tokens[i + 1]);
                segment.fees.push(fee);
            }
            _ => out.push(Segment {
                constant_product,
                tokens: vec![route.tokens[i], route.tokens[i + 1]],
                fees: vec![fee],
            }),
        }
    }
    out
}

/// V3 路径：token(20) | fee(3) | token(20) ...
pub fn encode_v3_path(tokens: &[Address], fees: &[u32]) -> Bytes {
    let mut path = Vec::with_capacity(tokens.len() * 20 + fees.len() * 3);
    for (i, token) in tokens.iter().enumerate() {
        path.extend_from_slice(token.as_bytes());
        if let Some(fee) = fees.get(i) {
            path.extend_from_slice(&fee.to_be_bytes()[1..]);
        }
    }
    path.into()
}

/// 生成 multicall(deadline, data[]) 的完整 calldata
pub fn encode_trade(
    request: &TradeRequest,
    splits: &[SplitRoute],
    minimums: &[U256],
    amount_out_minimum: U256,
) -> Bytes {
    let final_recipient = if request.native_out {
        ADDRESS_THIS
    } else {
        request.recipient
    };

    let mut data: Vec<Bytes> = Vec::new();
    for (split, minimum) in splits.iter().zip(minimums) {
        let parts = segments(split);
        let last = parts.len().saturating_sub(1);
        for (i, segment) in parts.into_iter().enumerate() {
            let amount_in = if i == 0 {
                split.amount_in
            } else {
                CONTRACT_BALANCE
            };
            let (recipient, amount_out_min) = if i == last {
                (final_recipient, *minimum)
            } else {
                (ADDRESS_THIS, U256::zero())
            };

            let encoded = if segment.constant_product {
                SwapExactTokensForTokensCall {
                    amount_in,
                    amount_out_min,
                    path: segment.tokens,
                    to: recipient,
                }
                .encode()
            } else {
                ExactInputCall {
                    params: ExactInputParams {
                        path: encode_v3_path(&segment.tokens, &segment.fees),
                        recipient,
                        amount_in,
                        amount_out_minimum: amount_out_min,
                    },
                }
                .encode()
            };
            data.push(encoded.into());
        }
    }

    if request.native_out {
        data.push(
            UnwrapWeth9Call {
                amount_minimum: amount_out_minimum,
                recipient: request.recipient,
            }
            .encode()
            .into(),
        );
    }

    RouterMulticallCall {
        deadline: request.deadline,
        data,
    }
    .encode()
    .into()
}
