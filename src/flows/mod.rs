//! 工具流程
//!
//! 每个流程组合解析、余额检查、授权和提交，成功时返回可独立核验的交易引用。

pub mod balance;
pub mod contract_call;
pub mod liquidity;
pub mod meme;
pub mod swap;
pub mod token_factory;
pub mod transfer;

use crate::error::{Result, TradingError};
use crate::token_registry::parse_address;
use ethers::types::Address;

/// 解析收款地址，拒绝零地址
pub fn parse_recipient(value: &str) -> Result<Address> {
    let address = parse_address(value.trim())
        .ok_or_else(|| TradingError::invalid(format!("无效的地址: '{}'", value)))?;
    if address.is_zero() {
        return Err(TradingError::invalid("不能使用零地址"));
    }
    Ok(address)
}
