use serde::{Deserialize, Serialize};

/// 查询余额请求参数
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetBalanceRequest {
    /// 钱包地址，不提供时查询当前签名账户
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// 代币符号或合约地址，不提供时查询 BNB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
