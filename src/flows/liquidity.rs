use super::parse_recipient;
use crate::contracts::{
    self, BalanceOfCall, CollectCall, CollectParams, DecreaseLiquidityCall, DecreaseLiquidityParams,
    MintCall, MintParams, PositionMulticallCall, PositionsCall, PositionsReturn, RefundEthCall,
    TokenOfOwnerByIndexCall,
};
use crate::engine::TradingEngine;
use crate::erc20::{format_units, parse_units};
use crate::error::{Result, TradingError};
use crate::position_math::{self, Slippage};
use crate::types::{ContractCall, Position, TokenDescriptor, TxReference};
use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, U256};
use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, instrument};

/// 添加流动性的输入，未填写的字段使用配置默认值
#[derive(Debug, Clone, Default)]
pub struct AddLiquidityParams {
    pub token_a: String,
    pub token_b: String,
    pub amount_a: String,
    pub amount_b: String,
    pub fee_tier: Option<u32>,
    pub lower_fraction: Option<f64>,
    pub upper_fraction: Option<f64>,
    pub slippage_bps: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddLiquidityOutcome {
    pub pool: Address,
    pub token0: String,
    pub token1: String,
    pub fee_tier: u32,
    pub current_tick: i32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: String,
    pub amount0_desired: String,
    pub amount1_desired: String,
    pub amount0_min: String,
    pub amount1_min: String,
    pub approvals: Vec<TxReference>,
    pub tx: TxReference,
}

/// 头寸概览
#[derive(Debug, Clone, Serialize)]
pub struct PositionView {
    pub id: String,
    pub token0: String,
    pub token1: String,
    pub token0_address: Address,
    pub token1_address: Address,
    pub fee_tier: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub current_tick: i32,
    pub in_range: bool,
    pub liquidity: String,
    pub amount0: String,
    pub amount1: String,
    pub fees_owed0: String,
    pub fees_owed1: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemovePositionOutcome {
    pub id: String,
    pub percent: u32,
    pub liquidity_removed: String,
    pub amount0_min: String,
    pub amount1_min: String,
    pub tx: TxReference,
}

/// 按地址排序后的一侧代币与投入数量
struct Side {
    token: TokenDescriptor,
    address: Address,
    amount: U256,
}

impl TradingEngine {
    /// 在 V3 池中按当前价格附近的区间铸造头寸
    #[instrument(skip(self, params), fields(token_a = %params.token_a, token_b = %params.token_b))]
    pub async fn add_liquidity(&self, params: &AddLiquidityParams) -> Result<AddLiquidityOutcome> {
        let owner = self.signer_address()?;
        let trading = &self.config().trading;
        let fee_tier = params.fee_tier.unwrap_or(trading.default_fee_tier);
        let lower = params.lower_fraction.unwrap_or(trading.range_lower_fraction);
        let upper = params.upper_fraction.unwrap_or(trading.range_upper_fraction);
        position_math::check_range_fractions(lower, upper)?;
        let slippage = self.slippage(params.slippage_bps)?;

        let (token_a, token_b) =
            tokio::try_join!(self.resolve(&params.token_a), self.resolve(&params.token_b))?;
        let wrapped = self.wrapped_native();
        let side_a = Side {
            address: token_a.wrapped_address(wrapped),
            amount: parse_units(&params.amount_a, token_a.decimals)?,
            token: token_a,
        };
        let side_b = Side {
            address: token_b.wrapped_address(wrapped),
            amount: parse_units(&params.amount_b, token_b.decimals)?,
            token: token_b,
        };
        if side_a.address == side_b.address {
            return Err(TradingError::invalid("两种代币在链上是同一个地址"));
        }
        if side_a.amount.is_zero() && side_b.amount.is_zero() {
            return Err(TradingError::invalid("至少一侧的投入数量必须大于 0"));
        }
        let (side0, side1) = if side_a.address < side_b.address {
            (side_a, side_b)
        } else {
            (side_b, side_a)
        };

        let state = self
            .pools()
            .pool_state(side0.address, side1.address, fee_tier)
            .await?;
        let range = position_math::range_for_pool(&state, lower, upper)?;
        let sizing = position_math::size_position(&state, range, side0.amount, side1.amount)?;
        let sizing = position_math::minimums_with_slippage(sizing, slippage)?;
        debug!(
            pool = %state.address,
            current_tick = state.current_tick,
            tick_lower = range.tick_lower,
            tick_upper = range.tick_upper,
            liquidity = sizing.liquidity,
            "头寸参数已计算"
        );

        tokio::try_join!(
            self.ensure_balance(&side0.token, owner, sizing.amount0_desired),
            self.ensure_balance(&side1.token, owner, sizing.amount1_desired),
        )?;

        let manager = self.config().pancake.position_manager;
        let guard = self.allowance_guard()?;
        let (approval0, approval1) = tokio::try_join!(
            guard.ensure_allowance(&side0.token, manager, sizing.amount0_desired),
            guard.ensure_allowance(&side1.token, manager, sizing.amount1_desired),
        )?;

        let mint = MintCall {
            params: MintParams {
                token_0: side0.address,
                token_1: side1.address,
                fee: fee_tier,
                tick_lower: range.tick_lower,
                tick_upper: range.tick_upper,
                amount_0_desired: sizing.amount0_desired,
                amount_1_desired: sizing.amount1_desired,
                amount_0_min: sizing.amount0_min,
                amount_1_min: sizing.amount1_min,
                recipient: owner,
                deadline: self.deadline(),
            },
        };
        let value = if side0.token.is_native() {
            sizing.amount0_desired
        } else if side1.token.is_native() {
            sizing.amount1_desired
        } else {
            U256::zero()
        };
        // 原生代币一侧多付的部分由 refundETH 退回
        let data = if value.is_zero() {
            mint.encode()
        } else {
            PositionMulticallCall {
                data: vec![Bytes::from(mint.encode()), Bytes::from(RefundEthCall.encode())],
            }
            .encode()
        };
        let call = ContractCall::new(manager, data, "mint").with_value(value);
        let tx = self.submitter()?.execute(&call).await?;

        info!(
            pool = %state.address,
            liquidity = sizing.liquidity,
            tx_hash = ?tx.hash,
            "流动性已添加"
        );

        Ok(AddLiquidityOutcome {
            pool: state.address,
            token0: side0.token.symbol.clone(),
            token1: side1.token.symbol.clone(),
            fee_tier,
            current_tick: state.current_tick,
            tick_lower: range.tick_lower,
            tick_upper: range.tick_upper,
            liquidity: sizing.liquidity.to_string(),
            amount0_desired: format_units(sizing.amount0_desired, side0.token.decimals),
            amount1_desired: format_units(sizing.amount1_desired, side1.token.decimals),
            amount0_min: format_units(sizing.amount0_min, side0.token.decimals),
            amount1_min: format_units(sizing.amount1_min, side1.token.decimals),
            approvals: approval0.into_iter().chain(approval1).collect(),
            tx,
        })
    }

    /// 列出地址持有的全部 V3 头寸，默认查询签名账户
    #[instrument(skip(self))]
    pub async fn my_positions(&self, owner: Option<&str>) -> Result<Vec<PositionView>> {
        let owner = match owner {
            Some(value) => parse_recipient(value)?,
            None => self.signer_address()?,
        };
        let manager = self.config().pancake.position_manager;
        let rpc = self.rpc().as_ref();

        let count: U256 = contracts::read(rpc, manager, BalanceOfCall { account: owner }).await?;
        let ids: Vec<U256> = try_join_all((0..count.low_u64()).map(|index| {
            contracts::read(
                rpc,
                manager,
                TokenOfOwnerByIndexCall {
                    owner,
                    index: U256::from(index),
                },
            )
        }))
        .await?;
        debug!(owner = %owner, count = ids.len(), "头寸编号已读取");

        try_join_all(ids.into_iter().map(|id| self.position_view(id))).await
    }

    /// 读取头寸，同时返回尚未领取的手续费
    async fn read_position(&self, id: U256) -> Result<(Position, [u128; 2])> {
        let raw: PositionsReturn = contracts::read(
            self.rpc().as_ref(),
            self.config().pancake.position_manager,
            PositionsCall { token_id: id },
        )
        .await?;
        let position = Position {
            id,
            token0: raw.token_0,
            token1: raw.token_1,
            fee_tier: raw.fee,
            tick_lower: raw.tick_lower,
            tick_upper: raw.tick_upper,
            liquidity: raw.liquidity,
        };
        Ok((position, [raw.tokens_owed_0, raw.tokens_owed_1]))
    }

    async fn position_view(&self, id: U256) -> Result<PositionView> {
        let (position, [owed0, owed1]) = self.read_position(id).await?;
        let (token0, token1, state) = tokio::try_join!(
            self.resolve_address(position.token0),
            self.resolve_address(position.token1),
            self.pools()
                .pool_state(position.token0, position.token1, position.fee_tier),
        )?;
        let range = position.range();
        let (amount0, amount1) = position_math::value_position(
            state.current_tick,
            range.tick_lower,
            range.tick_upper,
            position.liquidity,
        )?;

        Ok(PositionView {
            id: id.to_string(),
            token0: token0.symbol.clone(),
            token1: token1.symbol.clone(),
            token0_address: position.token0,
            token1_address: position.token1,
            fee_tier: position.fee_tier,
            tick_lower: range.tick_lower,
            tick_upper: range.tick_upper,
            current_tick: state.current_tick,
            in_range: (range.tick_lower..=range.tick_upper).contains(&state.current_tick),
            liquidity: position.liquidity.to_string(),
            amount0: format_units(amount0, token0.decimals),
            amount1: format_units(amount1, token1.decimals),
            fees_owed0: format_units(U256::from(owed0), token0.decimals),
            fees_owed1: format_units(U256::from(owed1), token1.decimals),
        })
    }

    /// 按百分比减少头寸流动性并把取出的代币和手续费全部领取到签名账户
    #[instrument(skip(self))]
    pub async fn remove_position(
        &self,
        id: U256,
        percent: u32,
        slippage_bps: Option<u32>,
    ) -> Result<RemovePositionOutcome> {
        if !(1..=100).contains(&percent) {
            return Err(TradingError::invalid(format!(
                "移除比例必须在 1 到 100 之间: {}",
                percent
            )));
        }
        let owner = self.signer_address()?;
        let slippage = self.slippage(slippage_bps)?;

        let (position, _) = self.read_position(id).await?;
        let removed = liquidity_share(position.liquidity, percent);
        if removed == 0 {
            return Err(TradingError::invalid(format!("头寸 {} 没有可移除的流动性", id)));
        }

        let state = self
            .pools()
            .pool_state(position.token0, position.token1, position.fee_tier)
            .await?;
        let (amount0, amount1) = position_math::value_position(
            state.current_tick,
            position.tick_lower,
            position.tick_upper,
            removed,
        )?;
        let (amount0_min, amount1_min) = minimums(slippage, amount0, amount1)?;

        let decrease = DecreaseLiquidityCall {
            params: DecreaseLiquidityParams {
                token_id: id,
                liquidity: removed,
                amount_0_min: amount0_min,
                amount_1_min: amount1_min,
                deadline: self.deadline(),
            },
        };
        let collect = CollectCall {
            params: CollectParams {
                token_id: id,
                recipient: owner,
                amount_0_max: u128::MAX,
                amount_1_max: u128::MAX,
            },
        };
        let data = PositionMulticallCall {
            data: vec![Bytes::from(decrease.encode()), Bytes::from(collect.encode())],
        }
        .encode();
        let call = ContractCall::new(self.config().pancake.position_manager, data, "decreaseLiquidity");
        let tx = self.submitter()?.execute(&call).await?;

        let (token0, token1) = tokio::try_join!(
            self.resolve_address(position.token0),
            self.resolve_address(position.token1),
        )?;
        info!(
            id = %id,
            percent = percent,
            liquidity = removed,
            tx_hash = ?tx.hash,
            "头寸流动性已移除"
        );

        Ok(RemovePositionOutcome {
            id: id.to_string(),
            percent,
            liquidity_removed: removed.to_string(),
            amount0_min: format_units(amount0_min, token0.decimals),
            amount1_min: format_units(amount1_min, token1.decimals),
            tx,
        })
    }
}

/// liquidity × percent / 100，向下取整
fn liquidity_share(liquidity: u128, percent: u32) -> u128 {
    let share = U256::from(liquidity) * U256::from(percent) / U256::from(100u32);
    share.low_u128()
}

fn minimums(slippage: Slippage, amount0: U256, amount1: U256) -> Result<(U256, U256)> {
    Ok((slippage.min_amount(amount0)?, slippage.min_amount(amount1)?))
}
