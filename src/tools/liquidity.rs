use crate::error::{Result, TradingError};
use crate::flows::liquidity::AddLiquidityParams;
use ethers::types::U256;
use serde::{Deserialize, Serialize};

/// 在 PancakeSwap V3 添加集中流动性
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AddLiquidityRequest {
    pub token_a: String,
    pub token_b: String,
    /// token_a 投入数量，可以为 "0"（单边）
    pub amount_a: String,
    pub amount_b: String,
    /// 费率档位（100 / 500 / 2500 / 10000），默认 2500
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_tier: Option<u32>,
    /// 区间下界相对当前价格的比例，默认 0.8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_fraction: Option<f64>,
    /// 区间上界相对当前价格的比例，默认 1.2
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_fraction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u32>,
}

impl From<AddLiquidityRequest> for AddLiquidityParams {
    fn from(request: AddLiquidityRequest) -> Self {
        Self {
            token_a: request.token_a,
            token_b: request.token_b,
            amount_a: request.amount_a,
            amount_b: request.amount_b,
            fee_tier: request.fee_tier,
            lower_fraction: request.lower_fraction,
            upper_fraction: request.upper_fraction,
            slippage_bps: request.slippage_bps,
        }
    }
}

/// 查询 V3 头寸
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MyPositionsRequest {
    /// 持有人地址，不提供时查询当前签名账户
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

/// 按比例移除头寸流动性
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct RemovePositionRequest {
    /// 头寸 NFT 编号（十进制）
    pub position_id: String,
    /// 移除比例 1-100
    pub percent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u32>,
}

impl RemovePositionRequest {
    pub fn id(&self) -> Result<U256> {
        U256::from_dec_str(self.position_id.trim())
            .map_err(|_| TradingError::invalid(format!("无效的头寸编号: {}", self.position_id)))
    }
}
