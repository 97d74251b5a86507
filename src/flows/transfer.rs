use super::parse_recipient;
use crate::engine::TradingEngine;
use crate::erc20::{self, parse_positive_units};
use crate::error::Result;
use crate::types::{ContractCall, TokenDescriptor, TxReference};
use ethers::types::Address;
use serde::Serialize;
use tracing::{info, instrument};

/// 转账结果
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub symbol: String,
    pub token_address: Option<Address>,
    pub recipient: Address,
    pub amount: String,
    pub amount_raw: String,
    pub tx: TxReference,
}

impl TradingEngine {
    /// 转账原生代币（BNB）
    #[instrument(skip(self))]
    pub async fn transfer_native(&self, recipient: &str, amount: &str) -> Result<TransferOutcome> {
        let native = TokenDescriptor::native(self.chain_id(), &self.config().chain.native_symbol);
        self.transfer(&native, recipient, amount).await
    }

    /// 转账 BEP20 代币；标识解析为原生代币时按原生转账处理
    #[instrument(skip(self))]
    pub async fn transfer_token(
        &self,
        token: &str,
        recipient: &str,
        amount: &str,
    ) -> Result<TransferOutcome> {
        let descriptor = self.resolve(token).await?;
        self.transfer(&descriptor, recipient, amount).await
    }

    async fn transfer(
        &self,
        token: &TokenDescriptor,
        recipient: &str,
        amount: &str,
    ) -> Result<TransferOutcome> {
        let recipient = parse_recipient(recipient)?;
        let raw = parse_positive_units(amount, token.decimals)?;
        let owner = self.signer_address()?;
        let submitter = self.submitter()?;

        self.ensure_balance(token, owner, raw).await?;

        let call = match token.address {
            None => ContractCall::new(recipient, Vec::new(), "transfer_native").with_value(raw),
            Some(address) => erc20::transfer_call(address, recipient, raw),
        };
        let tx = submitter.execute(&call).await?;

        info!(
            symbol = %token.symbol,
            recipient = %recipient,
            amount = %amount,
            tx_hash = ?tx.hash,
            "转账完成"
        );

        Ok(TransferOutcome {
            symbol: token.symbol.clone(),
            token_address: token.address,
            recipient,
            amount: erc20::format_units(raw, token.decimals),
            amount_raw: raw.to_string(),
            tx,
        })
    }
}
