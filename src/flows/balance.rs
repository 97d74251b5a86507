use super::parse_recipient;
use crate::engine::TradingEngine;
use crate::erc20::format_units;
use crate::error::Result;
use crate::types::TokenDescriptor;
use ethers::types::Address;
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Clone, Serialize)]
pub struct BalanceView {
    pub owner: Address,
    pub symbol: String,
    pub token_address: Option<Address>,
    pub decimals: u8,
    pub balance: String,
    pub balance_raw: String,
}

impl TradingEngine {
    /// 查询单个资产余额
    ///
    /// 未指定地址时查询签名账户，未指定代币时查询原生代币。
    #[instrument(skip(self))]
    pub async fn get_balance(&self, owner: Option<&str>, token: Option<&str>) -> Result<BalanceView> {
        let owner = match owner.map(str::trim).filter(|s| !s.is_empty()) {
            Some(value) => parse_recipient(value)?,
            None => self.signer_address()?,
        };
        let token = match token.map(str::trim).filter(|s| !s.is_empty()) {
            Some(identifier) => self.resolve(identifier).await?,
            None => TokenDescriptor::native(self.chain_id(), &self.config().chain.native_symbol),
        };
        let raw = self.balance_of(&token, owner).await?;

        Ok(BalanceView {
            owner,
            symbol: token.symbol.clone(),
            token_address: token.address,
            decimals: token.decimals,
            balance: format_units(raw, token.decimals),
            balance_raw: raw.to_string(),
        })
    }
}
