use crate::error::{Result, TradingError};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// 区块链 JSON-RPC 协作方
///
/// 核心逻辑只依赖这个 trait，生产环境由 [`EthClient`] 实现，测试中使用内存链。
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// eth_call 只读调用
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// 估算交易 Gas
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256>;

    /// 当前 Gas 价格（Wei）
    async fn gas_price(&self) -> Result<U256>;

    /// 原生代币余额（Wei）
    async fn native_balance(&self, address: Address) -> Result<U256>;

    /// 查询交易回执，未上链时返回 None
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>>;

    /// 链 ID
    async fn chain_id(&self) -> Result<u64>;
}

/// 基于 ethers Provider 的 RPC 客户端
#[derive(Clone)]
pub struct EthClient {
    provider: Option<Arc<Provider<Http>>>,
}

impl EthClient {
    /// 创建新的客户端
    ///
    /// # 参数
    /// - `rpc_url`: RPC 节点地址（可选）
    /// - `network_id`: 期望的 Chain ID（可选，仅用于校验告警）
    #[instrument(skip(rpc_url))]
    pub async fn new(rpc_url: Option<&str>, network_id: Option<u64>) -> anyhow::Result<Self> {
        let provider = if let Some(url) = rpc_url {
            info!(rpc_url = %mask_rpc_url(url), "初始化 BSC 客户端");

            match Provider::<Http>::try_from(url) {
                Ok(provider) => match provider.get_chainid().await {
                    Ok(chain_id) => {
                        let chain_id_u64 = chain_id.as_u64();
                        if let Some(expected) = network_id {
                            if expected != chain_id_u64 {
                                warn!(
                                    expected = expected,
                                    actual = chain_id_u64,
                                    "提供的 Chain ID 与节点返回值不一致"
                                );
                            }
                        }
                        info!(chain_id = %chain_id_u64, "成功连接到节点");
                        Some(Arc::new(provider))
                    }
                    Err(e) => {
                        warn!(error = %e, "无法连接到节点，链上功能不可用");
                        None
                    }
                },
                Err(e) => {
                    error!(error = %e, "创建 Provider 失败");
                    None
                }
            }
        } else {
            debug!("未配置 RPC URL，客户端将不可用");
            None
        };

        Ok(Self { provider })
    }

    /// 检查客户端是否可用
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    /// 取出底层 Provider（签名器复用同一连接）
    pub fn provider(&self) -> Option<Arc<Provider<Http>>> {
        self.provider.clone()
    }

    fn require_provider(&self) -> Result<&Arc<Provider<Http>>> {
        self.provider
            .as_ref()
            .ok_or_else(|| TradingError::Rpc("RPC URL 未配置或节点不可用".to_string()))
    }
}

#[async_trait]
impl ChainRpc for EthClient {
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let provider = self.require_provider()?;
        let tx: TypedTransaction = Eip1559TransactionRequest::new().to(to).data(data).into();
        Ok(provider.call(&tx, None).await?)
    }

    #[instrument(skip(self, tx))]
    async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256> {
        let provider = self.require_provider()?;
        Ok(provider.estimate_gas(tx, None).await?)
    }

    #[instrument(skip(self))]
    async fn gas_price(&self) -> Result<U256> {
        let provider = self.require_provider()?;
        let gas_price = provider.get_gas_price().await?;
        debug!(gas_price_gwei = %wei_to_gwei(gas_price), "获取 Gas 价格");
        Ok(gas_price)
    }

    #[instrument(skip(self))]
    async fn native_balance(&self, address: Address) -> Result<U256> {
        let provider = self.require_provider()?;
        let balance = provider.get_balance(address, None).await?;
        debug!(address = %address, balance_wei = %balance, "查询原生代币余额");
        Ok(balance)
    }

    #[instrument(skip(self))]
    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        let provider = self.require_provider()?;
        Ok(provider.get_transaction_receipt(hash).await?)
    }

    #[instrument(skip(self))]
    async fn chain_id(&self) -> Result<u64> {
        let provider = self.require_provider()?;
        Ok(provider.get_chainid().await?.as_u64())
    }
}

/// 隐藏 RPC URL 中的 API Key 部分
pub fn mask_rpc_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{}?***", base),
        None => url.to_string(),
    }
}

/// 将 Wei 转换为 Gwei（仅用于日志展示）
fn wei_to_gwei(wei: U256) -> String {
    crate::erc20::format_units(wei, 9)
}
