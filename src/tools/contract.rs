use crate::flows::contract_call::ContractCallRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 按 JSON ABI 调用任意合约函数
#[derive(Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CallContractRequest {
    /// 合约 ABI（JSON 字符串）
    pub abi: String,
    /// 合约地址
    pub contract_address: String,
    /// 函数名，ABI 中不能有同名重载
    pub function_name: String,
    /// 参数数组，大整数请用十进制或 0x 开头的十六进制字符串
    #[serde(default)]
    pub args: Value,
    /// 随交易发送的 BNB 数量，仅 payable 函数可用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl From<CallContractRequest> for ContractCallRequest {
    fn from(request: CallContractRequest) -> Self {
        Self {
            abi: request.abi,
            contract: request.contract_address,
            function: request.function_name,
            args: request.args,
            value: request.value,
        }
    }
}
