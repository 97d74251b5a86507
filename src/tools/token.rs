use serde::{Deserialize, Serialize};

/// 通过发币合约创建 BEP20 代币
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CreateTokenRequest {
    pub name: String,
    pub symbol: String,
    /// 总发行量（整币数量，精度固定 18）
    pub total_supply: String,
}
