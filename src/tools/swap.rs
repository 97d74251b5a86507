use serde::{Deserialize, Serialize};

/// 兑换或报价请求
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SwapRequest {
    /// 卖出的代币符号或地址（BNB 表示原生代币）
    pub token_in: String,
    /// 买入的代币符号或地址
    pub token_out: String,
    /// 卖出数量
    pub amount: String,
    /// 滑点（基点，默认 50 = 0.5%）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage_bps: Option<u32>,
}
