use crate::engine::TradingEngine;
use crate::erc20::{format_units, parse_positive_units};
use crate::error::{Result, TradingError};
use crate::routing::{self, RouteSummary, Trade, TradeRequest};
use crate::types::{ContractCall, TokenDescriptor, TxReference};
use serde::Serialize;
use tracing::{info, instrument};

/// 兑换报价（未提交）
#[derive(Debug, Clone, Serialize)]
pub struct SwapQuote {
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub expected_out: String,
    pub amount_out_minimum: String,
    pub gas_cost_in_output: String,
    pub slippage_bps: u64,
    pub routes: Vec<RouteSummary>,
}

/// 兑换结果
#[derive(Debug, Clone, Serialize)]
pub struct SwapOutcome {
    #[serde(flatten)]
    pub quote: SwapQuote,
    /// 本次发起的授权交易
    pub approval: Option<TxReference>,
    pub tx: TxReference,
}

struct PreparedSwap {
    token_in: TokenDescriptor,
    token_out: TokenDescriptor,
    trade: Trade,
    slippage_bps: u64,
}

impl PreparedSwap {
    fn quote(&self) -> SwapQuote {
        SwapQuote {
            token_in: self.token_in.symbol.clone(),
            token_out: self.token_out.symbol.clone(),
            amount_in: format_units(self.trade.amount_in, self.token_in.decimals),
            expected_out: format_units(self.trade.expected_out, self.token_out.decimals),
            amount_out_minimum: format_units(self.trade.amount_out_minimum, self.token_out.decimals),
            gas_cost_in_output: format_units(self.trade.gas_cost, self.token_out.decimals),
            slippage_bps: self.slippage_bps,
            routes: self.trade.splits.iter().map(RouteSummary::from).collect(),
        }
    }
}

impl TradingEngine {
    /// 解析代币、发现候选池并选出最优路由
    async fn prepare_swap(
        &self,
        token_in: &str,
        token_out: &str,
        amount: &str,
        slippage_bps: Option<u32>,
    ) -> Result<PreparedSwap> {
        let (token_in, token_out) = tokio::try_join!(self.resolve(token_in), self.resolve(token_out))?;
        let wrapped = self.wrapped_native();
        let (address_in, address_out) = (
            token_in.wrapped_address(wrapped),
            token_out.wrapped_address(wrapped),
        );
        if address_in == address_out {
            return Err(TradingError::invalid(format!(
                "{} 与 {} 在链上是同一个代币",
                token_in.symbol, token_out.symbol
            )));
        }

        let amount_in = parse_positive_units(amount, token_in.decimals)?;
        let slippage = self.slippage(slippage_bps)?;
        let engine = self.route_engine()?;
        // 报价时没有签名器也可以，收款地址只影响 calldata
        let recipient = self.signer_address().unwrap_or_default();

        let (candidates, gas_price) = tokio::try_join!(
            routing::discover_candidates(
                self.pools(),
                address_in,
                address_out,
                &self.config().pancake.base_tokens,
                self.config().trading.discovery_concurrency,
            ),
            self.rpc().gas_price(),
        )?;

        let request = TradeRequest {
            token_in: address_in,
            token_out: address_out,
            amount_in,
            native_in: token_in.is_native(),
            native_out: token_out.is_native(),
            recipient,
            deadline: self.deadline(),
            slippage,
            gas_price,
            wrapped_native: wrapped,
        };
        let trade = engine.find_best_trade(&request, &candidates)?;
        let trade =
            routing::requote_trade(self.rpc().as_ref(), self.config().pancake.quoter, &request, trade).await?;

        Ok(PreparedSwap {
            token_in,
            token_out,
            trade,
            slippage_bps: slippage.bps(),
        })
    }

    /// 只报价，不发送交易
    #[instrument(skip(self))]
    pub async fn quote_swap(
        &self,
        token_in: &str,
        token_out: &str,
        amount: &str,
        slippage_bps: Option<u32>,
    ) -> Result<SwapQuote> {
        Ok(self
            .prepare_swap(token_in, token_out, amount, slippage_bps)
            .await?
            .quote())
    }

    /// 通过 SmartRouter 执行兑换
    #[instrument(skip(self))]
    pub async fn swap(
        &self,
        token_in: &str,
        token_out: &str,
        amount: &str,
        slippage_bps: Option<u32>,
    ) -> Result<SwapOutcome> {
        let owner = self.signer_address()?;
        let prepared = self
            .prepare_swap(token_in, token_out, amount, slippage_bps)
            .await?;
        let amount_in = prepared.trade.amount_in;
        let router = self.config().pancake.smart_router;

        self.ensure_balance(&prepared.token_in, owner, amount_in).await?;
        let approval = self
            .allowance_guard()?
            .ensure_allowance(&prepared.token_in, router, amount_in)
            .await?;

        let call = ContractCall::new(router, prepared.trade.calldata.clone(), "swap")
            .with_value(prepared.trade.value);
        let tx = self.submitter()?.execute(&call).await?;

        info!(
            token_in = %prepared.token_in.symbol,
            token_out = %prepared.token_out.symbol,
            amount_in = %amount_in,
            amount_out_minimum = %prepared.trade.amount_out_minimum,
            splits = prepared.trade.splits.len(),
            hops = prepared.trade.total_hops(),
            tx_hash = ?tx.hash,
            "兑换完成"
        );

        Ok(SwapOutcome {
            quote: prepared.quote(),
            approval,
            tx,
        })
    }
}
