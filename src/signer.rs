use crate::error::{Result, TradingError};
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::Arc;
use tracing::{info, instrument};

/// 签名协作方：只暴露地址和“签名并广播”能力，核心逻辑从不接触私钥
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// 签名账户地址
    fn address(&self) -> Address;

    /// 签名并广播交易，返回交易哈希（不等待确认）
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256>;
}

/// 本地私钥签名器
///
/// nonce 由本地管理，多笔授权并发广播时不会相互覆盖。
pub struct WalletSigner {
    address: Address,
    client: NonceManagerMiddleware<SignerMiddleware<Arc<Provider<Http>>, LocalWallet>>,
}

impl WalletSigner {
    /// 从注入的私钥字符串创建签名器
    pub fn new(provider: Arc<Provider<Http>>, private_key: &str, chain_id: u64) -> Result<Self> {
        let key = private_key.strip_prefix("0x").unwrap_or(private_key);
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| TradingError::Signer(format!("无效的私钥: {}", e)))?
            .with_chain_id(chain_id);

        info!(address = %wallet.address(), chain_id = chain_id, "签名器已就绪");

        let address = wallet.address();
        Ok(Self {
            address,
            client: NonceManagerMiddleware::new(SignerMiddleware::new(provider, wallet), address),
        })
    }
}

#[async_trait]
impl TxSigner for WalletSigner {
    fn address(&self) -> Address {
        self.address
    }

    #[instrument(skip(self, tx))]
    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| TradingError::Signer(e.to_string()))?;
        Ok(pending.tx_hash())
    }
}
