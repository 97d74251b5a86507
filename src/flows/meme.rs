//! four.meme 联合曲线代币买卖
//!
//! 买入前先在 helper 合约上 `tryBuy` 试算，再按所选的定额策略调用 token manager。

use crate::contracts::{self, BuyTokenAmapCall, SellTokenCall, TryBuyCall, TryBuyReturn};
use crate::engine::TradingEngine;
use crate::erc20::{format_units, parse_positive_units};
use crate::error::{Result, TradingError};
use crate::position_math::{Slippage, mul_div};
use crate::types::{ContractCall, TokenDescriptor, TxReference};
use ethers::abi::AbiEncode;
use ethers::types::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

/// 固定花费时最小买到数量相对试算结果的容忍度（20%）
const SPEND_FUNDS_TOLERANCE: (u64, u64) = (20, 100);
/// 固定数量时在试算花费之上多付的比例（5%）
const TARGET_AMOUNT_PREMIUM_PERCENT: u64 = 5;

/// 买入定额策略
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemeBuySizing {
    /// 花费固定数量的原生代币，能买多少买多少
    SpendFunds { funds: String },
    /// 买入固定数量的代币
    TargetAmount { amount: String },
}

impl MemeBuySizing {
    fn name(&self) -> &'static str {
        match self {
            MemeBuySizing::SpendFunds { .. } => "spend_funds",
            MemeBuySizing::TargetAmount { .. } => "target_amount",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemeBuyOutcome {
    pub token_address: Address,
    pub symbol: String,
    pub sizing: &'static str,
    pub estimated_amount: String,
    pub min_amount: String,
    pub funds: String,
    pub tx: TxReference,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemeSellOutcome {
    pub token_address: Address,
    pub symbol: String,
    pub amount: String,
    pub approval: Option<TxReference>,
    pub tx: TxReference,
}

/// 试算结果换算出的 buyTokenAMAP 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuyOrder {
    funds: U256,
    min_amount: U256,
}

fn buy_order(sizing: &MemeBuySizing, estimate: &TryBuyReturn) -> Result<BuyOrder> {
    match sizing {
        MemeBuySizing::SpendFunds { .. } => {
            let (numerator, denominator) = SPEND_FUNDS_TOLERANCE;
            Ok(BuyOrder {
                funds: estimate.amount_msg_value,
                min_amount: Slippage::new(numerator, denominator)?
                    .min_amount(estimate.estimated_amount)?,
            })
        }
        MemeBuySizing::TargetAmount { .. } => Ok(BuyOrder {
            funds: mul_div(
                estimate.amount_msg_value,
                U256::from(100 + TARGET_AMOUNT_PREMIUM_PERCENT),
                U256::from(100u64),
            )?,
            min_amount: estimate.estimated_amount,
        }),
    }
}

impl TradingEngine {
    async fn meme_token(&self, token: &str) -> Result<(TokenDescriptor, Address)> {
        let descriptor = self.resolve(token).await?;
        let address = descriptor
            .address
            .ok_or_else(|| TradingError::invalid("原生代币不能在联合曲线上交易"))?;
        Ok((descriptor, address))
    }

    /// 在联合曲线上买入代币
    #[instrument(skip(self))]
    pub async fn meme_buy(&self, token: &str, sizing: MemeBuySizing) -> Result<MemeBuyOutcome> {
        let owner = self.signer_address()?;
        let (descriptor, address) = self.meme_token(token).await?;
        let native = TokenDescriptor::native(self.chain_id(), &self.config().chain.native_symbol);

        let query = match &sizing {
            MemeBuySizing::SpendFunds { funds } => TryBuyCall {
                token: address,
                amount: U256::zero(),
                funds: parse_positive_units(funds, native.decimals)?,
            },
            MemeBuySizing::TargetAmount { amount } => TryBuyCall {
                token: address,
                amount: parse_positive_units(amount, descriptor.decimals)?,
                funds: U256::zero(),
            },
        };
        let contracts_config = &self.config().contracts;
        let estimate: TryBuyReturn =
            contracts::read(self.rpc().as_ref(), contracts_config.meme_helper, query).await?;
        debug!(
            estimated_amount = %estimate.estimated_amount,
            amount_msg_value = %estimate.amount_msg_value,
            estimated_fee = %estimate.estimated_fee,
            "tryBuy 试算完成"
        );
        if estimate.estimated_amount.is_zero() {
            return Err(TradingError::invalid(format!(
                "{} 在联合曲线上无法买入",
                descriptor.symbol
            )));
        }
        let manager = contracts_config.meme_token_manager;
        if !estimate.token_manager.is_zero() && estimate.token_manager != manager {
            warn!(
                reported = %estimate.token_manager,
                configured = %manager,
                "试算返回的 token manager 与配置不一致"
            );
        }

        let order = buy_order(&sizing, &estimate)?;
        self.ensure_balance(&native, owner, order.funds).await?;

        let call = ContractCall::new(
            manager,
            BuyTokenAmapCall {
                token: address,
                funds: order.funds,
                min_amount: order.min_amount,
            }
            .encode(),
            "buyTokenAMAP",
        )
        .with_value(order.funds);
        let tx = self.submitter()?.execute(&call).await?;

        info!(
            token = %address,
            sizing = sizing.name(),
            funds = %order.funds,
            min_amount = %order.min_amount,
            tx_hash = ?tx.hash,
            "联合曲线买入完成"
        );

        Ok(MemeBuyOutcome {
            token_address: address,
            symbol: descriptor.symbol.clone(),
            sizing: sizing.name(),
            estimated_amount: format_units(estimate.estimated_amount, descriptor.decimals),
            min_amount: format_units(order.min_amount, descriptor.decimals),
            funds: format_units(order.funds, native.decimals),
            tx,
        })
    }

    /// 把代币卖回联合曲线
    #[instrument(skip(self))]
    pub async fn meme_sell(&self, token: &str, amount: &str) -> Result<MemeSellOutcome> {
        let owner = self.signer_address()?;
        let (descriptor, address) = self.meme_token(token).await?;
        let raw = parse_positive_units(amount, descriptor.decimals)?;
        let manager = self.config().contracts.meme_token_manager;

        self.ensure_balance(&descriptor, owner, raw).await?;
        let approval = self
            .allowance_guard()?
            .ensure_allowance(&descriptor, manager, raw)
            .await?;

        let call = ContractCall::new(
            manager,
            SellTokenCall {
                token: address,
                amount: raw,
            }
            .encode(),
            "sellToken",
        );
        let tx = self.submitter()?.execute(&call).await?;
        info!(token = %address, amount = %raw, tx_hash = ?tx.hash, "联合曲线卖出完成");

        Ok(MemeSellOutcome {
            token_address: address,
            symbol: descriptor.symbol.clone(),
            amount: format_units(raw, descriptor.decimals),
            approval,
            tx,
        })
    }
}
