use crate::error::{Result, TradingError};
use crate::flows::meme::MemeBuySizing;
use serde::{Deserialize, Serialize};

/// 在 four.meme 联合曲线上买入
///
/// `funds` 与 `amount` 二选一：前者花费固定 BNB，后者买入固定数量代币。
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MemeBuyRequest {
    /// 代币合约地址
    pub token: String,
    /// 花费的 BNB 数量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funds: Option<String>,
    /// 希望买到的代币数量
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl MemeBuyRequest {
    pub fn sizing(&self) -> Result<MemeBuySizing> {
        let set = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != "0")
                .map(str::to_string)
        };
        match (set(&self.funds), set(&self.amount)) {
            (Some(funds), None) => Ok(MemeBuySizing::SpendFunds { funds }),
            (None, Some(amount)) => Ok(MemeBuySizing::TargetAmount { amount }),
            _ => Err(TradingError::invalid("funds 和 amount 必须且只能提供一个")),
        }
    }
}

/// 把代币卖回联合曲线
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct MemeSellRequest {
    pub token: String,
    pub amount: String,
}
