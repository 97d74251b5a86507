//! 集中流动性头寸的定点数计算
//!
//! 全部使用整数运算，结果向零截断。价格平方根均为 Q64.96。

use crate::error::{Result, TradingError};
use crate::tick_math::{self, MAX_TICK, MIN_TICK};
use crate::types::{PoolState, PositionRange, PositionSizing};
use ethers::types::{U256, U512};

fn q96() -> U256 {
    U256::one() << 96
}

/// 有理数形式的滑点容忍度，numerator / denominator < 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slippage {
    numerator: u64,
    denominator: u64,
}

impl Slippage {
    pub const BPS_DENOMINATOR: u64 = 10_000;

    pub fn new(numerator: u64, denominator: u64) -> Result<Self> {
        if denominator == 0 {
            return Err(TradingError::invalid("滑点分母不能为 0"));
        }
        if numerator >= denominator {
            return Err(TradingError::invalid(format!(
                "滑点必须小于 100%: {}/{}",
                numerator, denominator
            )));
        }
        Ok(Self {
            numerator,
            denominator,
        })
    }

    /// 从基点创建（50 = 0.5%）
    pub fn from_bps(bps: u32) -> Result<Self> {
        Self::new(bps as u64, Self::BPS_DENOMINATOR)
    }

    pub fn zero() -> Self {
        Self {
            numerator: 0,
            denominator: 1,
        }
    }

    /// floor(amount × (1 − τ))
    pub fn min_amount(&self, amount: U256) -> Result<U256> {
        mul_div(
            amount,
            U256::from(self.denominator - self.numerator),
            U256::from(self.denominator),
        )
    }

    pub fn bps(&self) -> u64 {
        self.numerator * Self::BPS_DENOMINATOR / self.denominator
    }
}

/// floor(a × b / denominator)，中间结果 512 位
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(TradingError::invalid("除数为 0"));
    }
    let result = a.full_mul(b) / U512::from(denominator);
    u512_to_u256(result).ok_or_else(|| TradingError::invalid("定点运算结果溢出 256 位"))
}

fn u512_to_u256(value: U512) -> Option<U256> {
    let mut buf = [0u8; 64];
    value.to_big_endian(&mut buf);
    if buf[..32].iter().any(|b| *b != 0) {
        return None;
    }
    Some(U256::from_big_endian(&buf[32..]))
}

fn ordered(sqrt_a: U256, sqrt_b: U256) -> (U256, U256) {
    if sqrt_a > sqrt_b { (sqrt_b, sqrt_a) } else { (sqrt_a, sqrt_b) }
}

/// 仅由 token0 数量可得的流动性
pub fn liquidity_for_amount0(sqrt_a: U256, sqrt_b: U256, amount0: U256) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_a == sqrt_b {
        return Err(TradingError::invalid("价格区间宽度为 0"));
    }
    let intermediate = mul_div(sqrt_a, sqrt_b, q96())?;
    mul_div(amount0, intermediate, sqrt_b - sqrt_a)
}

/// 仅由 token1 数量可得的流动性
pub fn liquidity_for_amount1(sqrt_a: U256, sqrt_b: U256, amount1: U256) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_a == sqrt_b {
        return Err(TradingError::invalid("价格区间宽度为 0"));
    }
    mul_div(amount1, q96(), sqrt_b - sqrt_a)
}

/// 区间内流动性对应的 token0 数量
pub fn amount0_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_a.is_zero() {
        return Err(TradingError::invalid("价格平方根为 0"));
    }
    let scaled = U256::from(liquidity) << 96;
    Ok(mul_div(scaled, sqrt_b - sqrt_a, sqrt_b)? / sqrt_a)
}

/// 区间内流动性对应的 token1 数量
pub fn amount1_for_liquidity(sqrt_a: U256, sqrt_b: U256, liquidity: u128) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    mul_div(U256::from(liquidity), sqrt_b - sqrt_a, q96())
}

/// 两种代币数量能提供的最大流动性
///
/// 当前价格在区间内时取两侧的较小值，否则只看单侧代币。
pub fn liquidity_for_amounts(
    sqrt_current: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    amount0: U256,
    amount1: U256,
) -> Result<U256> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_current <= sqrt_a {
        liquidity_for_amount0(sqrt_a, sqrt_b, amount0)
    } else if sqrt_current < sqrt_b {
        let l0 = liquidity_for_amount0(sqrt_current, sqrt_b, amount0)?;
        let l1 = liquidity_for_amount1(sqrt_a, sqrt_current, amount1)?;
        Ok(l0.min(l1))
    } else {
        liquidity_for_amount1(sqrt_a, sqrt_b, amount1)
    }
}

/// 给定流动性在当前价格下对应的两种代币数量
pub fn amounts_for_liquidity(
    sqrt_current: U256,
    sqrt_a: U256,
    sqrt_b: U256,
    liquidity: u128,
) -> Result<(U256, U256)> {
    let (sqrt_a, sqrt_b) = ordered(sqrt_a, sqrt_b);
    if sqrt_current <= sqrt_a {
        Ok((amount0_for_liquidity(sqrt_a, sqrt_b, liquidity)?, U256::zero()))
    } else if sqrt_current < sqrt_b {
        Ok((
            amount0_for_liquidity(sqrt_current, sqrt_b, liquidity)?,
            amount1_for_liquidity(sqrt_a, sqrt_current, liquidity)?,
        ))
    } else {
        Ok((U256::zero(), amount1_for_liquidity(sqrt_a, sqrt_b, liquidity)?))
    }
}

fn validate_range(range: PositionRange, spacing: Option<i32>) -> Result<()> {
    if range.tick_lower >= range.tick_upper {
        return Err(TradingError::invalid(format!(
            "tick 下界必须小于上界: {} >= {}",
            range.tick_lower, range.tick_upper
        )));
    }
    if range.tick_lower < MIN_TICK || range.tick_upper > MAX_TICK {
        return Err(TradingError::invalid("tick 区间超出协议边界"));
    }
    if let Some(spacing) = spacing {
        if range.tick_lower % spacing != 0 || range.tick_upper % spacing != 0 {
            return Err(TradingError::invalid(format!(
                "tick 区间 [{}, {}] 不是 spacing {} 的整数倍",
                range.tick_lower, range.tick_upper, spacing
            )));
        }
    }
    Ok(())
}

/// 价格比例必须满足 0 < lower < 1 < upper 且均为有限值
pub fn check_range_fractions(lower_fraction: f64, upper_fraction: f64) -> Result<()> {
    let valid = lower_fraction > 0.0
        && lower_fraction < 1.0
        && upper_fraction > 1.0
        && upper_fraction.is_finite();
    if !valid {
        return Err(TradingError::invalid(format!(
            "价格区间比例必须满足 0 < lower < 1 < upper，当前 {} / {}",
            lower_fraction, upper_fraction
        )));
    }
    Ok(())
}

/// 按当前价格和价格比例为池子生成 tick 区间
pub fn range_for_pool(pool: &PoolState, lower_fraction: f64, upper_fraction: f64) -> Result<PositionRange> {
    check_range_fractions(lower_fraction, upper_fraction)?;
    let spacing = tick_math::tick_spacing(pool.fee_tier)?;
    let (tick_lower, tick_upper) =
        tick_math::range_around(pool.current_tick, lower_fraction, upper_fraction, spacing)?;
    Ok(PositionRange {
        tick_lower,
        tick_upper,
    })
}

/// 根据期望投入数量计算 mint 参数
///
/// 返回的 desired 数量由可得流动性反推，可能小于输入；最小值暂等于 desired。
pub fn size_position(
    pool: &PoolState,
    range: PositionRange,
    amount0: U256,
    amount1: U256,
) -> Result<PositionSizing> {
    let spacing = tick_math::tick_spacing(pool.fee_tier)?;
    validate_range(range, Some(spacing))?;

    let sqrt_a = tick_math::sqrt_ratio_at_tick(range.tick_lower)?;
    let sqrt_b = tick_math::sqrt_ratio_at_tick(range.tick_upper)?;

    let liquidity = liquidity_for_amounts(pool.sqrt_price_x96, sqrt_a, sqrt_b, amount0, amount1)?;
    if liquidity > U256::from(u128::MAX) {
        return Err(TradingError::invalid("流动性超出 uint128 范围"));
    }
    let liquidity = liquidity.as_u128();
    if liquidity == 0 {
        return Err(TradingError::invalid("投入数量过小，无法提供流动性"));
    }

    let (amount0_desired, amount1_desired) =
        amounts_for_liquidity(pool.sqrt_price_x96, sqrt_a, sqrt_b, liquidity)?;

    Ok(PositionSizing {
        liquidity,
        amount0_desired,
        amount1_desired,
        amount0_min: amount0_desired,
        amount1_min: amount1_desired,
    })
}

/// 按滑点下调最小数量
pub fn minimums_with_slippage(sizing: PositionSizing, tolerance: Slippage) -> Result<PositionSizing> {
    Ok(PositionSizing {
        amount0_min: tolerance.min_amount(sizing.amount0_desired)?,
        amount1_min: tolerance.min_amount(sizing.amount1_desired)?,
        ..sizing
    })
}

/// 按当前 tick 估算头寸中两种代币的数量
pub fn value_position(
    current_tick: i32,
    tick_lower: i32,
    tick_upper: i32,
    liquidity: u128,
) -> Result<(U256, U256)> {
    validate_range(
        PositionRange {
            tick_lower,
            tick_upper,
        },
        None,
    )?;
    let sqrt_lower = tick_math::sqrt_ratio_at_tick(tick_lower)?;
    let sqrt_upper = tick_math::sqrt_ratio_at_tick(tick_upper)?;

    if current_tick < tick_lower {
        Ok((amount0_for_liquidity(sqrt_lower, sqrt_upper, liquidity)?, U256::zero()))
    } else if current_tick > tick_upper {
        Ok((U256::zero(), amount1_for_liquidity(sqrt_lower, sqrt_upper, liquidity)?))
    } else {
        let sqrt_current = tick_math::sqrt_ratio_at_tick(current_tick)?;
        Ok((
            amount0_for_liquidity(sqrt_current, sqrt_upper, liquidity)?,
            amount1_for_liquidity(sqrt_lower, sqrt_current, liquidity)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;

    fn pool_at(tick: i32, fee_tier: u32) -> PoolState {
        PoolState {
            address: Address::repeat_byte(0x70),
            token0: Address::repeat_byte(0x01),
            token1: Address::repeat_byte(0x02),
            fee_tier,
            sqrt_price_x96: tick_math::sqrt_ratio_at_tick(tick).unwrap(),
            current_tick: tick,
            liquidity: 1_000_000_000_000_000_000,
        }
    }

    fn ether(n: u64) -> U256 {
        U256::from(n) * U256::exp10(18)
    }

    #[test]
    fn test_slippage_rejects_full_tolerance() {
        assert!(Slippage::from_bps(10_000).is_err());
        assert!(Slippage::from_bps(20_000).is_err());
        assert!(Slippage::new(1, 0).is_err());
        assert!(Slippage::from_bps(9_999).is_ok());
        assert_eq!(Slippage::from_bps(50).unwrap().bps(), 50);
    }

    #[test]
    fn test_min_amount_floor_rounding() {
        let tolerance = Slippage::from_bps(50).unwrap();
        // 1000 * 0.995 = 995
        assert_eq!(tolerance.min_amount(U256::from(1000)).unwrap(), U256::from(995));
        // 999 * 0.995 = 994.005 → 994
        assert_eq!(tolerance.min_amount(U256::from(999)).unwrap(), U256::from(994));
        assert_eq!(Slippage::zero().min_amount(U256::from(7)).unwrap(), U256::from(7));
    }

    #[test]
    fn test_min_amount_never_exceeds_desired() {
        let desired = [U256::zero(), U256::one(), U256::from(12345), ether(3), U256::MAX];
        for bps in [0u32, 1, 50, 100, 2_500, 9_999] {
            let tolerance = Slippage::from_bps(bps).unwrap();
            for amount in desired {
                let min = tolerance.min_amount(amount).unwrap();
                assert!(min <= amount);
                let expected = amount.full_mul(U256::from(10_000 - bps)) / U512::from(10_000u64);
                assert_eq!(U512::from(min), expected);
            }
        }
    }

    #[test]
    fn test_mul_div_full_precision() {
        // (2^255 * 4) / 8 无法用 256 位中间结果完成
        let big = U256::one() << 255;
        assert_eq!(mul_div(big, U256::from(4), U256::from(8)).unwrap(), big >> 1);
        assert!(mul_div(U256::MAX, U256::from(2), U256::one()).is_err());
        assert!(mul_div(U256::one(), U256::one(), U256::zero()).is_err());
    }

    #[test]
    fn test_value_position_branches() {
        let liquidity = 1_000_000_000_000_000_000u128;

        let (a0, a1) = value_position(50, 100, 200, liquidity).unwrap();
        assert!(a0 > U256::zero());
        assert!(a1.is_zero());

        let (a0, a1) = value_position(250, 100, 200, liquidity).unwrap();
        assert!(a0.is_zero());
        assert!(a1 > U256::zero());

        let (a0, a1) = value_position(150, 100, 200, liquidity).unwrap();
        assert!(a0 > U256::zero());
        assert!(a1 > U256::zero());
    }

    #[test]
    fn test_value_position_rejects_inverted_range() {
        assert!(value_position(0, 200, 100, 1).is_err());
        assert!(value_position(0, 100, 100, 1).is_err());
    }

    #[test]
    fn test_value_position_zero_liquidity() {
        assert_eq!(
            value_position(150, 100, 200, 0).unwrap(),
            (U256::zero(), U256::zero())
        );
    }

    #[test]
    fn test_range_fractions_must_straddle_current_price() {
        assert!(check_range_fractions(0.8, 1.2).is_ok());
        for (lower, upper) in [(1.5, 2.0), (0.8, 0.9), (0.0, 1.2), (0.8, f64::INFINITY), (f64::NAN, 1.2)] {
            assert!(matches!(
                check_range_fractions(lower, upper),
                Err(TradingError::InvalidInput(_))
            ));
        }
        assert!(range_for_pool(&pool_at(0, 2500), 1.5, 2.0).is_err());
    }

    #[test]
    fn test_size_position_straddling_range() {
        let pool = pool_at(0, 2500);
        let range = range_for_pool(&pool, 0.8, 1.2).unwrap();
        assert_eq!(range.tick_lower % 50, 0);
        assert_eq!(range.tick_upper % 50, 0);

        let sizing = size_position(&pool, range, ether(1), ether(1)).unwrap();
        assert!(sizing.liquidity > 0);
        assert!(sizing.amount0_desired <= ether(1));
        assert!(sizing.amount1_desired <= ether(1));
        // 其中一侧为约束侧，几乎全部用完
        let slack0 = ether(1) - sizing.amount0_desired;
        let slack1 = ether(1) - sizing.amount1_desired;
        assert!(slack0 <= U256::from(2) || slack1 <= U256::from(2));
    }

    #[test]
    fn test_size_position_one_sided_ranges() {
        let pool = pool_at(0, 500);

        // 区间在当前价格之上：只需要 token0
        let above = PositionRange {
            tick_lower: 100,
            tick_upper: 1000,
        };
        let sizing = size_position(&pool, above, ether(1), ether(5)).unwrap();
        assert!(sizing.amount0_desired > U256::zero());
        assert!(sizing.amount1_desired.is_zero());

        // 区间在当前价格之下：只需要 token1
        let below = PositionRange {
            tick_lower: -1000,
            tick_upper: -100,
        };
        let sizing = size_position(&pool, below, ether(5), ether(1)).unwrap();
        assert!(sizing.amount0_desired.is_zero());
        assert!(sizing.amount1_desired > U256::zero());
    }

    #[test]
    fn test_size_position_rejects_unaligned_range() {
        let pool = pool_at(0, 2500);
        let range = PositionRange {
            tick_lower: -75,
            tick_upper: 100,
        };
        assert!(matches!(
            size_position(&pool, range, ether(1), ether(1)),
            Err(TradingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_size_position_rejects_dust() {
        let pool = pool_at(0, 2500);
        let range = PositionRange {
            tick_lower: -50,
            tick_upper: 50,
        };
        assert!(size_position(&pool, range, U256::zero(), U256::zero()).is_err());
    }

    #[test]
    fn test_sizing_value_roundtrip() {
        for (tick, fee) in [(0, 2500), (-23_028, 500), (41_000, 10000), (-7, 100)] {
            let pool = pool_at(tick, fee);
            let range = range_for_pool(&pool, 0.8, 1.2).unwrap();
            let sizing = size_position(&pool, range, ether(10), ether(10)).unwrap();

            let (v0, v1) =
                value_position(tick, range.tick_lower, range.tick_upper, sizing.liquidity).unwrap();
            let close = |a: U256, b: U256| {
                let diff = if a > b { a - b } else { b - a };
                diff <= U256::from(2)
            };
            assert!(close(v0, sizing.amount0_desired), "tick={} v0={} d0={}", tick, v0, sizing.amount0_desired);
            assert!(close(v1, sizing.amount1_desired), "tick={} v1={} d1={}", tick, v1, sizing.amount1_desired);
        }
    }

    #[test]
    fn test_minimums_with_slippage() {
        let pool = pool_at(0, 2500);
        let range = range_for_pool(&pool, 0.8, 1.2).unwrap();
        let sizing = size_position(&pool, range, ether(1), ether(1)).unwrap();
        let with_min = minimums_with_slippage(sizing, Slippage::from_bps(100).unwrap()).unwrap();

        assert_eq!(with_min.liquidity, sizing.liquidity);
        assert_eq!(with_min.amount0_desired, sizing.amount0_desired);
        assert!(with_min.amount0_min <= with_min.amount0_desired);
        assert!(with_min.amount1_min <= with_min.amount1_desired);
        assert_eq!(
            with_min.amount0_min,
            sizing.amount0_desired * U256::from(99) / U256::from(100)
        );
    }
}
