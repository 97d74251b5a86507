//! Tick 与价格之间的换算
//!
//! price = 1.0001^tick，sqrtPriceX96 = sqrt(1.0001^tick) * 2^96。

use crate::error::{Result, TradingError};
use ethers::types::{U256, U512};

/// 协议允许的最小 tick
pub const MIN_TICK: i32 = -887272;
/// 协议允许的最大 tick
pub const MAX_TICK: i32 = 887272;

/// 每个 tick 的价格基数
pub const TICK_BASE: f64 = 1.0001;

/// 费率档位（百万分之一）→ tick spacing，PancakeSwap V3 官方表
const FEE_TIER_SPACINGS: [(u32, i32); 4] = [(100, 1), (500, 10), (2500, 50), (10000, 200)];

/// 获取费率档位对应的 tick spacing
pub fn tick_spacing(fee_tier: u32) -> Result<i32> {
    FEE_TIER_SPACINGS
        .iter()
        .find(|(fee, _)| *fee == fee_tier)
        .map(|(_, spacing)| *spacing)
        .ok_or_else(|| TradingError::invalid(format!("不支持的费率档位: {}", fee_tier)))
}

/// 支持的全部费率档位
pub fn fee_tiers() -> impl Iterator<Item = u32> {
    FEE_TIER_SPACINGS.iter().map(|(fee, _)| *fee)
}

/// 价格 → tick（向下取整）
///
/// 浮点误差在 1e-6 以内时按最近整数处理，避免 1.0001^t 被取整成 t-1。
pub fn price_to_tick(price: f64) -> Result<i32> {
    if !price.is_finite() || price <= 0.0 {
        return Err(TradingError::invalid(format!("价格必须为正数: {}", price)));
    }

    let raw = price.ln() / TICK_BASE.ln();
    let nearest = raw.round();
    let tick = if (raw - nearest).abs() < 1e-6 {
        nearest
    } else {
        raw.floor()
    };

    if tick < MIN_TICK as f64 || tick > MAX_TICK as f64 {
        return Err(TradingError::invalid(format!("价格超出 tick 范围: {}", price)));
    }
    Ok(tick as i32)
}

/// 价格比例 → tick 偏移量（取绝对值后向下取整）
///
/// 0.8 和 1.25 得到的偏移量相同量级但方向由调用方决定。
pub fn ratio_to_tick_offset(ratio: f64) -> Result<i32> {
    if !ratio.is_finite() || ratio <= 0.0 {
        return Err(TradingError::invalid(format!("价格比例必须为正数: {}", ratio)));
    }
    let offset = (ratio.ln() / TICK_BASE.ln()).abs().floor();
    if offset > MAX_TICK as f64 {
        return Err(TradingError::invalid(format!("价格比例过大: {}", ratio)));
    }
    Ok(offset as i32)
}

/// tick → 价格（token1/token0，未按精度调整）
pub fn tick_to_price(tick: i32) -> f64 {
    TICK_BASE.powi(tick)
}

/// 四舍五入到最近的可用 tick，并限制在协议边界内
pub fn nearest_usable_tick(tick: i32, spacing: i32) -> Result<i32> {
    if spacing <= 0 {
        return Err(TradingError::invalid(format!("tick spacing 必须为正数: {}", spacing)));
    }
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(TradingError::invalid(format!("tick 超出范围: {}", tick)));
    }

    // round-half-up: floor((2t + s) / 2s)
    let t = tick as i64;
    let s = spacing as i64;
    let rounded = (2 * t + s).div_euclid(2 * s) * s;

    let rounded = if rounded < MIN_TICK as i64 {
        rounded + s
    } else if rounded > MAX_TICK as i64 {
        rounded - s
    } else {
        rounded
    };
    Ok(rounded as i32)
}

/// 以当前 tick 为中心，按价格比例计算可用的区间边界
///
/// lower = current - floor(|log(lower_ratio)|)，upper = current + floor(|log(upper_ratio)|)，
/// 两端再对齐到 spacing；对齐后重合时把上界推开一个 spacing。
pub fn range_around(
    current_tick: i32,
    lower_ratio: f64,
    upper_ratio: f64,
    spacing: i32,
) -> Result<(i32, i32)> {
    let lower_raw = current_tick.saturating_sub(ratio_to_tick_offset(lower_ratio)?);
    let upper_raw = current_tick.saturating_add(ratio_to_tick_offset(upper_ratio)?);

    let tick_lower = nearest_usable_tick(lower_raw.clamp(MIN_TICK, MAX_TICK), spacing)?;
    let mut tick_upper = nearest_usable_tick(upper_raw.clamp(MIN_TICK, MAX_TICK), spacing)?;
    if tick_upper <= tick_lower {
        tick_upper = tick_lower + spacing;
    }
    if tick_upper > MAX_TICK {
        return Err(TradingError::invalid("价格区间超出协议上界"));
    }
    Ok((tick_lower, tick_upper))
}

/// tick → Q64.96 价格平方根（与链上 TickMath.getSqrtRatioAtTick 逐位一致）
pub fn sqrt_ratio_at_tick(tick: i32) -> Result<U256> {
    if !(MIN_TICK..=MAX_TICK).contains(&tick) {
        return Err(TradingError::invalid(format!("tick 超出范围: {}", tick)));
    }
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        U256::from(0xfffcb933bd6fad37aa2d162d1a594001u128)
    } else {
        U256::one() << 128
    };

    const MAGIC: [(u32, u128); 19] = [
        (0x2, 0xfff97272373d413259a46990580e213a),
        (0x4, 0xfff2e50f5f656932ef12357cf3c7fdcc),
        (0x8, 0xffe5caca7e10e4e61c3624eaa0941cd0),
        (0x10, 0xffcb9843d60f6159c9db58835c926644),
        (0x20, 0xff973b41fa98c081472e6896dfb254c0),
        (0x40, 0xff2ea16466c96a3843ec78b326b52861),
        (0x80, 0xfe5dee046a99a2a811c461f1969c3053),
        (0x100, 0xfcbe86c7900a88aedcffc83b479aa3a4),
        (0x200, 0xf987a7253ac413176f2b074cf7815e54),
        (0x400, 0xf3392b0822b70005940c7a398e4b70f3),
        (0x800, 0xe7159475a2c29b7443b29c7fa6e889d9),
        (0x1000, 0xd097f3bdfd2022b8845ad8f792aa5825),
        (0x2000, 0xa9f746462d870fdf8a65dc1f90e061e5),
        (0x4000, 0x70d869a156d2a1b890bb3df62baf32f7),
        (0x8000, 0x31be135f97d08fd981231505542fcfa6),
        (0x10000, 0x9aa508b5b7a84e1c677de54f3e99bc9),
        (0x20000, 0x5d6af8dedb81196699c329225ee604),
        (0x40000, 0x2216e584f5fa1ea926041bedfe98),
        (0x80000, 0x48a170391f7dc42444e8fa2),
    ];

    for (bit, magic) in MAGIC {
        if abs_tick & bit != 0 {
            ratio = mul_shift_128(ratio, U256::from(magic));
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 → Q64.96，向上取整
    let shifted = ratio >> 32;
    let remainder = ratio & U256::from(u32::MAX);
    Ok(if remainder.is_zero() {
        shifted
    } else {
        shifted + U256::one()
    })
}

/// (a * b) >> 128，中间结果使用 512 位
fn mul_shift_128(a: U256, b: U256) -> U256 {
    let product: U512 = a.full_mul(b) >> 128;
    u512_low_u256(product)
}

/// 取 U512 的低 256 位（调用方保证不溢出）
pub(crate) fn u512_low_u256(value: U512) -> U256 {
    let mut buf = [0u8; 64];
    value.to_big_endian(&mut buf);
    U256::from_big_endian(&buf[32..])
}
