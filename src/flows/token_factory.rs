use crate::contracts::{self, CreateTokenCall, CreateTokenEvent};
use crate::engine::TradingEngine;
use crate::erc20::parse_positive_units;
use crate::error::{Result, TradingError};
use crate::types::{ContractCall, TxReference};
use ethers::abi::AbiEncode;
use ethers::types::Address;
use serde::Serialize;
use tracing::{info, instrument};

/// 新发行代币固定 18 位精度
const CREATED_TOKEN_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Serialize)]
pub struct CreatedToken {
    pub token_address: Address,
    pub name: String,
    pub symbol: String,
    pub total_supply: String,
    pub tx: TxReference,
}

impl TradingEngine {
    /// 通过发币合约创建 BEP20 代币，从回执事件中取回新代币地址
    #[instrument(skip(self))]
    pub async fn create_token(&self, name: &str, symbol: &str, total_supply: &str) -> Result<CreatedToken> {
        let (name, symbol) = (name.trim(), symbol.trim());
        if name.is_empty() || symbol.is_empty() {
            return Err(TradingError::invalid("代币名称和符号不能为空"));
        }
        let supply = parse_positive_units(total_supply, CREATED_TOKEN_DECIMALS)?;
        let submitter = self.submitter()?;

        let creator = self.config().contracts.token_creator;
        let call = ContractCall::new(
            creator,
            CreateTokenCall {
                name: name.to_string(),
                symbol: symbol.to_string(),
                total_supply: supply,
            }
            .encode(),
            "createToken",
        );
        let receipt = submitter.submit(&call).await?;
        let event: CreateTokenEvent = contracts::decode_event(&receipt.logs, creator)?;

        info!(
            token = %event.token,
            creater = %event.creater,
            nonce = %event.creater_nonce,
            "代币创建成功"
        );

        Ok(CreatedToken {
            token_address: event.token,
            name: name.to_string(),
            symbol: symbol.to_string(),
            total_supply: total_supply.trim().to_string(),
            tx: submitter.reference(&receipt),
        })
    }
}
