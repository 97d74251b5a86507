use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use crate::signer::TxSigner;
use crate::types::{ContractCall, TxReference};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, TransactionReceipt, TransactionRequest, U64, U256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// 提交与确认策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitPolicy {
    /// Gas 估算的安全余量（基点）
    pub gas_margin_bps: u32,
    /// 回执轮询次数
    pub confirmation_retries: u32,
    /// 两次轮询之间的固定间隔
    pub confirmation_delay: Duration,
}

impl Default for SubmitPolicy {
    fn default() -> Self {
        Self {
            gas_margin_bps: 1_000,
            confirmation_retries: 300,
            confirmation_delay: Duration::from_millis(100),
        }
    }
}

/// gas × (10000 + margin) / 10000
///
/// 乘积超出 256 位说明节点返回的估算不可信，直接报错而不是截断。
pub fn apply_gas_margin(gas: U256, margin_bps: u32) -> Result<U256> {
    gas.checked_mul(U256::from(10_000u64 + u64::from(margin_bps)))
        .map(|scaled| scaled / U256::from(10_000u32))
        .ok_or_else(|| TradingError::Rpc(format!("Gas 估算值异常: {}", gas)))
}

/// 交易构造、估算、广播与确认
#[derive(Clone)]
pub struct TxSubmitter {
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TxSigner>,
    policy: SubmitPolicy,
    explorer_url: String,
}

impl TxSubmitter {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TxSigner>,
        policy: SubmitPolicy,
        explorer_url: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            signer,
            policy,
            explorer_url: explorer_url.into(),
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    /// 估算 Gas、广播并等待确认
    #[instrument(skip(self, call), fields(label = call.label, to = %call.to))]
    pub async fn submit(&self, call: &ContractCall) -> Result<TransactionReceipt> {
        let mut tx: TypedTransaction = TransactionRequest::new()
            .from(self.signer.address())
            .to(call.to)
            .data(call.data.clone())
            .value(call.value)
            .into();

        let estimated = self.rpc.estimate_gas(&tx).await?;
        let gas_limit = apply_gas_margin(estimated, self.policy.gas_margin_bps)?;
        let gas_price = self.rpc.gas_price().await?;
        tx.set_gas(gas_limit);
        tx.set_gas_price(gas_price);

        debug!(
            estimated_gas = %estimated,
            gas_limit = %gas_limit,
            gas_price = %gas_price,
            "交易已估算"
        );

        let hash = self.signer.send_transaction(tx).await?;
        info!(tx_hash = ?hash, label = call.label, "交易已广播，等待确认");

        self.wait_for_receipt(hash).await
    }

    /// 提交并返回可供核验的交易引用
    pub async fn execute(&self, call: &ContractCall) -> Result<TxReference> {
        let receipt = self.submit(call).await?;
        Ok(self.reference(&receipt))
    }

    /// 固定次数、固定间隔轮询回执
    ///
    /// 超时只是停止等待，已广播的交易仍可能上链。
    #[instrument(skip(self))]
    pub async fn wait_for_receipt(&self, hash: H256) -> Result<TransactionReceipt> {
        let retries = self.policy.confirmation_retries;
        for attempt in 1..=retries {
            match self.rpc.transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status != Some(U64::one()) {
                        warn!(tx_hash = ?hash, status = ?receipt.status, "交易执行失败");
                        return Err(TradingError::TransactionReverted(hash));
                    }
                    info!(
                        tx_hash = ?hash,
                        block = ?receipt.block_number,
                        attempt = attempt,
                        "交易已确认"
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => warn!(tx_hash = ?hash, error = %e, "查询回执失败，继续轮询"),
            }
            if attempt < retries {
                tokio::time::sleep(self.policy.confirmation_delay).await;
            }
        }

        warn!(tx_hash = ?hash, attempts = retries, "等待确认超时");
        Err(TradingError::ConfirmationTimeout {
            hash,
            attempts: retries,
        })
    }

    pub fn reference(&self, receipt: &TransactionReceipt) -> TxReference {
        TxReference {
            hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
            explorer_url: TxReference::explorer_link(&self.explorer_url, receipt.transaction_hash),
        }
    }
}
