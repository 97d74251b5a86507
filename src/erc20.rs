use crate::contracts::{
    self, AllowanceCall, ApproveCall, BalanceOfCall, DecimalsCall, NameCall, SymbolCall,
    TransferCall,
};
use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use crate::types::ContractCall;
use ethers::abi::AbiEncode;
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

/// 链上读取到的代币元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnChainMetadata {
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

/// BEP20/ERC20 客户端
#[derive(Clone)]
pub struct Erc20Client {
    rpc: Arc<dyn ChainRpc>,
}

impl Erc20Client {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }

    /// 查询代币余额
    #[instrument(skip(self))]
    pub async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        debug!(token_address = %token, owner_address = %owner, "查询代币余额");
        contracts::read(self.rpc.as_ref(), token, BalanceOfCall { account: owner }).await
    }

    /// 查询授权额度
    #[instrument(skip(self))]
    pub async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        contracts::read(self.rpc.as_ref(), token, AllowanceCall { owner, spender }).await
    }

    /// 查询代币小数位数
    #[instrument(skip(self))]
    pub async fn decimals(&self, token: Address) -> Result<u8> {
        contracts::read(self.rpc.as_ref(), token, DecimalsCall).await
    }

    /// 查询代币符号
    #[instrument(skip(self))]
    pub async fn symbol(&self, token: Address) -> Result<String> {
        contracts::read(self.rpc.as_ref(), token, SymbolCall).await
    }

    /// 查询代币名称
    #[instrument(skip(self))]
    pub async fn name(&self, token: Address) -> Result<String> {
        contracts::read(self.rpc.as_ref(), token, NameCall).await
    }

    /// 并发读取 decimals/symbol/name，任一失败即视为没有链上数据
    #[instrument(skip(self))]
    pub async fn metadata(&self, token: Address) -> Result<OnChainMetadata> {
        let (decimals, symbol, name) =
            tokio::join!(self.decimals(token), self.symbol(token), self.name(token));

        Ok(OnChainMetadata {
            decimals: decimals?,
            symbol: symbol?,
            name: name?,
        })
    }
}

/// 构造 approve 调用
pub fn approve_call(token: Address, spender: Address, amount: U256) -> ContractCall {
    ContractCall::new(token, ApproveCall { spender, amount }.encode(), "approve")
}

/// 构造 transfer 调用
pub fn transfer_call(token: Address, recipient: Address, amount: U256) -> ContractCall {
    ContractCall::new(token, TransferCall { recipient, amount }.encode(), "transfer")
}

/// 格式化代币金额
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    // 精度 >= 78 时 10^decimals 超出 256 位，任何金额都只有小数部分
    let (integer_part, fractional_part) = match U256::from(10).checked_pow(U256::from(decimals)) {
        Some(divisor) => (amount / divisor, amount % divisor),
        None => (U256::zero(), amount),
    };

    if fractional_part.is_zero() {
        integer_part.to_string()
    } else {
        // 格式化小数部分，移除尾部的 0
        let frac_str = format!("{:0width$}", fractional_part, width = decimals as usize);
        let frac_trimmed = frac_str.trim_end_matches('0');
        if frac_trimmed.is_empty() {
            integer_part.to_string()
        } else {
            format!("{}.{}", integer_part, frac_trimmed)
        }
    }
}

/// 解析代币金额（使用 Decimal 保持精度）
pub fn parse_units(amount_str: &str, decimals: u8) -> Result<U256> {
    let decimal = Decimal::from_str(amount_str.trim()).map_err(|e| {
        TradingError::invalid(format!("无法解析金额 '{}': {}", amount_str, e))
    })?;

    if decimal.is_sign_negative() {
        return Err(TradingError::invalid("金额不能为负数"));
    }

    let decimal_str = decimal.normalize().to_string();

    let (integer_part, fractional_part) = match decimal_str.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (decimal_str.as_str(), ""),
    };

    // 检查精度是否超过代币支持的精度
    if fractional_part.len() > decimals as usize {
        return Err(TradingError::invalid(format!(
            "金额 '{}' 的精度超过了代币支持的 {} 位小数",
            amount_str, decimals
        )));
    }

    let padding_zeros = decimals as usize - fractional_part.len();
    let final_str = format!("{}{}{}", integer_part, fractional_part, "0".repeat(padding_zeros));

    U256::from_dec_str(&final_str)
        .map_err(|e| TradingError::invalid(format!("金额过大，无法转换: {}", e)))
}

/// 解析金额且要求大于零
pub fn parse_positive_units(amount_str: &str, decimals: u8) -> Result<U256> {
    let amount = parse_units(amount_str, decimals)?;
    if amount.is_zero() {
        return Err(TradingError::invalid(format!("金额必须大于 0: '{}'", amount_str)));
    }
    Ok(amount)
}
