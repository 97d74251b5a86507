//! 单个池子的输出估算

use crate::pool_gateway::{PairState, sort_tokens};
use crate::position_math::mul_div;
use crate::tick_math::{self, MAX_TICK, MIN_TICK};
use crate::types::PoolState;
use ethers::types::{Address, U256};
use serde::Serialize;

/// PancakeSwap V2 手续费 0.25%
pub const V2_FEE_BPS: u32 = 25;

const FEE_PPM_DENOMINATOR: u32 = 1_000_000;

/// 池子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolKind {
    /// 恒定乘积（V2）
    ConstantProduct,
    /// 集中流动性（V3），费率为百万分之一
    Concentrated { fee_tier: u32 },
}

/// 路由图中的一条边
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCandidate {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub kind: PoolKind,
    pub reserve0: U256,
    pub reserve1: U256,
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub liquidity: u128,
}

impl PoolCandidate {
    pub fn constant_product(pair: &PairState) -> Self {
        Self {
            address: pair.address,
            token0: pair.token0,
            token1: pair.token1,
            kind: PoolKind::ConstantProduct,
            reserve0: pair.reserve0,
            reserve1: pair.reserve1,
            sqrt_price_x96: U256::zero(),
            tick: 0,
            liquidity: 0,
        }
    }

    pub fn concentrated(pool: &PoolState) -> Self {
        let (token0, token1) = sort_tokens(pool.token0, pool.token1);
        Self {
            address: pool.address,
            token0,
            token1,
            kind: PoolKind::Concentrated {
                fee_tier: pool.fee_tier,
            },
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            sqrt_price_x96: pool.sqrt_price_x96,
            tick: pool.current_tick,
            liquidity: pool.liquidity,
        }
    }

    pub fn touches(&self, token: Address) -> bool {
        self.token0 == token || self.token1 == token
    }

    /// 池子另一侧的代币
    pub fn other(&self, token: Address) -> Option<Address> {
        if token == self.token0 {
            Some(self.token1)
        } else if token == self.token1 {
            Some(self.token0)
        } else {
            None
        }
    }

    /// 是否有可用流动性
    pub fn is_live(&self) -> bool {
        match self.kind {
            PoolKind::ConstantProduct => !self.reserve0.is_zero() && !self.reserve1.is_zero(),
            PoolKind::Concentrated { .. } => self.liquidity > 0 && !self.sqrt_price_x96.is_zero(),
        }
    }

    /// 当前活跃流动性在兑换方向上保证覆盖到的价格边界
    ///
    /// 链下只知道当前 tick spacing 区间内的流动性，边界取相邻的可初始化 tick；
    /// 价格恰好落在下边界上时向下再让出一个 spacing。
    fn window_limit(&self, zero_for_one: bool, fee_tier: u32) -> Option<U256> {
        let spacing = tick_math::tick_spacing(fee_tier).ok()?;
        let floor = self.tick.div_euclid(spacing) * spacing;
        let boundary = if zero_for_one {
            let at_floor = tick_math::sqrt_ratio_at_tick(floor.clamp(MIN_TICK, MAX_TICK)).ok()?;
            if at_floor < self.sqrt_price_x96 {
                floor
            } else {
                floor - spacing
            }
        } else {
            floor + spacing
        };
        tick_math::sqrt_ratio_at_tick(boundary.clamp(MIN_TICK, MAX_TICK)).ok()
    }

    /// 以 token_in 输入 amount_in 的预估输出，方向不匹配或无流动性时为 None
    pub fn quote(&self, token_in: Address, amount_in: U256) -> Option<U256> {
        if amount_in.is_zero() || !self.touches(token_in) {
            return None;
        }
        let zero_for_one = token_in == self.token0;
        let out = match self.kind {
            PoolKind::ConstantProduct => {
                let (reserve_in, reserve_out) = if zero_for_one {
                    (self.reserve0, self.reserve1)
                } else {
                    (self.reserve1, self.reserve0)
                };
                constant_product_out(amount_in, reserve_in, reserve_out, V2_FEE_BPS)?
            }
            PoolKind::Concentrated { fee_tier } => concentrated_out(
                amount_in,
                zero_for_one,
                self.sqrt_price_x96,
                self.window_limit(zero_for_one, fee_tier)?,
                self.liquidity,
                fee_tier,
            )?,
        };
        (!out.is_zero()).then_some(out)
    }
}

/// 恒定乘积公式
///
/// amountOut = amountIn·(10000−fee)·reserveOut / (reserveIn·10000 + amountIn·(10000−fee))
pub fn constant_product_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    fee_bps: u32,
) -> Option<U256> {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return None;
    }
    let amount_in_with_fee = amount_in.checked_mul(U256::from(10_000 - fee_bps))?;
    let denominator = reserve_in
        .checked_mul(U256::from(10_000))?
        .checked_add(amount_in_with_fee)?;
    mul_div(amount_in_with_fee, reserve_out, denominator).ok()
}

/// 集中流动性池的输出估算
///
/// 只在 sqrt_limit_x96 之内使用当前流动性；输入足以把价格推过边界时，
/// 输出按边界处可得的数量封顶，不假设边界之外还有流动性。
pub fn concentrated_out(
    amount_in: U256,
    zero_for_one: bool,
    sqrt_price_x96: U256,
    sqrt_limit_x96: U256,
    liquidity: u128,
    fee_ppm: u32,
) -> Option<U256> {
    if liquidity == 0 || sqrt_price_x96.is_zero() || fee_ppm >= FEE_PPM_DENOMINATOR {
        return None;
    }
    let valid_limit = if zero_for_one {
        !sqrt_limit_x96.is_zero() && sqrt_limit_x96 < sqrt_price_x96
    } else {
        sqrt_limit_x96 > sqrt_price_x96
    };
    if !valid_limit {
        return None;
    }

    let q96 = U256::one() << 96;
    let liquidity = U256::from(liquidity);
    let amount_in = mul_div(
        amount_in,
        U256::from(FEE_PPM_DENOMINATOR - fee_ppm),
        U256::from(FEE_PPM_DENOMINATOR),
    )
    .ok()?;

    if zero_for_one {
        // 推到边界所需 Δx = L·Q96·(√P − √B) / (√P·√B)
        let capacity_in = mul_div(liquidity << 96, sqrt_price_x96 - sqrt_limit_x96, sqrt_price_x96).ok()?
            / sqrt_limit_x96;
        if amount_in >= capacity_in {
            return mul_div(liquidity, sqrt_price_x96 - sqrt_limit_x96, q96).ok();
        }
        // √P' = L·√P / (L + Δx·√P / Q96)
        let delta = mul_div(amount_in, sqrt_price_x96, q96).ok()?;
        let denominator = liquidity.checked_add(delta)?;
        let next = mul_div(liquidity, sqrt_price_x96, denominator).ok()?;
        // Δy = L·(√P − √P') / Q96
        mul_div(liquidity, sqrt_price_x96 - next, q96).ok()
    } else {
        // 推到边界所需 Δy = L·(√B − √P) / Q96
        let capacity_in = mul_div(liquidity, sqrt_limit_x96 - sqrt_price_x96, q96).ok()?;
        let next = if amount_in >= capacity_in {
            sqrt_limit_x96
        } else {
            // √P' = √P + Δy·Q96 / L
            sqrt_price_x96.checked_add(mul_div(amount_in, q96, liquidity).ok()?)?
        };
        // Δx = L·Q96·(√P' − √P) / (√P'·√P)
        let numerator = mul_div(liquidity << 96, next - sqrt_price_x96, next).ok()?;
        Some(numerator / sqrt_price_x96)
    }
}
