use serde::{Deserialize, Serialize};

/// 转账 BNB
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TransferNativeRequest {
    /// 收款地址
    pub recipient: String,
    /// 数量（BNB，十进制字符串，如 "0.1"）
    pub amount: String,
}

/// 转账 BEP20 代币
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct TransferTokenRequest {
    /// 代币符号或合约地址
    pub token: String,
    pub recipient: String,
    /// 数量（按代币精度的十进制字符串）
    pub amount: String,
}
