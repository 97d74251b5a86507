//! 交易引擎：组合解析、授权、池子读取、路由与提交
//!
//! 每个工具流程都实现为 `TradingEngine` 上的方法，分布在 `flows` 下各文件中。

use crate::allowance::AllowanceGuard;
use crate::config::Config;
use crate::erc20::Erc20Client;
use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use crate::pool_gateway::PoolGateway;
use crate::position_math::Slippage;
use crate::routing::{RouteSearchEngine, SearchLimits};
use crate::signer::TxSigner;
use crate::token_registry::{RegistryCache, TokenListProvider, TokenResolver};
use crate::tx::{SubmitPolicy, TxSubmitter};
use crate::types::{Amount, TokenDescriptor};
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

pub struct TradingEngine {
    config: Arc<Config>,
    rpc: Arc<dyn ChainRpc>,
    signer: Option<Arc<dyn TxSigner>>,
    resolver: TokenResolver,
    erc20: Erc20Client,
    pools: PoolGateway,
}

impl TradingEngine {
    /// 没有签名器时只能执行只读操作
    pub fn new(
        config: Arc<Config>,
        rpc: Arc<dyn ChainRpc>,
        signer: Option<Arc<dyn TxSigner>>,
        token_list: Arc<dyn TokenListProvider>,
    ) -> Self {
        let erc20 = Erc20Client::new(rpc.clone());
        let cache = Arc::new(RegistryCache::new(Duration::from_secs(
            config.token_list.ttl_secs,
        )));
        let resolver = TokenResolver::new(
            config.chain.native_symbol.clone(),
            erc20.clone(),
            token_list,
            cache,
        );
        let pools = PoolGateway::new(
            rpc.clone(),
            config.pancake.v2_factory,
            config.pancake.v3_factory,
        );

        Self {
            config,
            rpc,
            signer,
            resolver,
            erc20,
            pools,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
        &self.rpc
    }

    pub fn erc20(&self) -> &Erc20Client {
        &self.erc20
    }

    pub fn pools(&self) -> &PoolGateway {
        &self.pools
    }

    pub fn chain_id(&self) -> u64 {
        self.config.chain.chain_id
    }

    pub fn wrapped_native(&self) -> Address {
        self.config.chain.wrapped_native
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    fn signer(&self) -> Result<&Arc<dyn TxSigner>> {
        self.signer
            .as_ref()
            .ok_or_else(|| TradingError::Signer("未配置私钥，无法发送交易".to_string()))
    }

    pub fn signer_address(&self) -> Result<Address> {
        Ok(self.signer()?.address())
    }

    pub fn submitter(&self) -> Result<TxSubmitter> {
        let trading = &self.config.trading;
        Ok(TxSubmitter::new(
            self.rpc.clone(),
            self.signer()?.clone(),
            SubmitPolicy {
                gas_margin_bps: trading.gas_margin_bps,
                confirmation_retries: trading.confirmation_retries,
                confirmation_delay: Duration::from_millis(trading.confirmation_delay_ms),
            },
            self.config.chain.explorer_url.clone(),
        ))
    }

    pub fn allowance_guard(&self) -> Result<AllowanceGuard> {
        Ok(AllowanceGuard::new(self.erc20.clone(), self.submitter()?))
    }

    pub fn route_engine(&self) -> Result<RouteSearchEngine> {
        let trading = &self.config.trading;
        RouteSearchEngine::new(SearchLimits {
            max_hops: trading.max_hops,
            max_splits: trading.max_splits,
            split_step_percent: trading.split_step_percent,
        })
    }

    /// 调用方未指定时使用配置中的默认滑点
    pub fn slippage(&self, bps: Option<u32>) -> Result<Slippage> {
        Slippage::from_bps(bps.unwrap_or(self.config.trading.default_slippage_bps))
    }

    /// 当前时间 + 配置的截止秒数
    pub fn deadline(&self) -> U256 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        U256::from(now + self.config.trading.deadline_secs)
    }

    /// 解析代币标识
    pub async fn resolve(&self, identifier: &str) -> Result<TokenDescriptor> {
        self.resolver.resolve(identifier, self.chain_id()).await
    }

    pub async fn resolve_address(&self, address: Address) -> Result<TokenDescriptor> {
        self.resolver.resolve_address(address, self.chain_id()).await
    }

    /// 原生代币或 ERC20 余额
    #[instrument(skip(self, token), fields(symbol = %token.symbol))]
    pub async fn balance_of(&self, token: &TokenDescriptor, owner: Address) -> Result<U256> {
        match token.address {
            None => self.rpc.native_balance(owner).await,
            Some(address) => self.erc20.balance_of(address, owner).await,
        }
    }

    /// 余额不足时返回 InsufficientBalance，不发送任何交易
    pub async fn ensure_balance(
        &self,
        token: &TokenDescriptor,
        owner: Address,
        required: U256,
    ) -> Result<()> {
        let available = self.balance_of(token, owner).await?;
        debug!(
            symbol = %token.symbol,
            available = %available,
            required = %required,
            "余额检查"
        );
        if available < required {
            return Err(TradingError::InsufficientBalance {
                symbol: token.symbol.clone(),
                required: Amount::new(token.clone(), required).display(),
                available: Amount::new(token.clone(), available).display(),
            });
        }
        Ok(())
    }
}
