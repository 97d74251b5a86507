use crate::erc20::Erc20Client;
use crate::error::{Result, TradingError};
use crate::types::TokenDescriptor;
use async_trait::async_trait;
use ethers::types::Address;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// 代币列表中的一条记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListEntry {
    pub chain_id: u64,
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

impl TokenListEntry {
    fn descriptor(&self) -> TokenDescriptor {
        TokenDescriptor {
            chain_id: self.chain_id,
            address: Some(self.address),
            decimals: self.decimals,
            symbol: self.symbol.clone(),
            name: self.name.clone(),
        }
    }
}

/// 代币元数据列表提供方（仅作参考，不保证完整）
#[async_trait]
pub trait TokenListProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<TokenListEntry>>;
}

#[derive(Debug, Deserialize)]
struct TokenListResponse {
    tokens: Vec<TokenListEntry>,
}

/// 通过 HTTP 拉取 PancakeSwap 风格的代币列表
pub struct HttpTokenList {
    client: Client,
    url: String,
}

impl HttpTokenList {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradingError::TokenList(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl TokenListProvider for HttpTokenList {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<TokenListEntry>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TradingError::TokenList(e.to_string()))?;

        let list: TokenListResponse = response
            .json()
            .await
            .map_err(|e| TradingError::TokenList(format!("代币列表格式错误: {}", e)))?;

        debug!(count = list.tokens.len(), "已拉取代币列表");
        Ok(list.tokens)
    }
}

/// 未配置列表地址时使用的空列表
pub struct EmptyTokenList;

#[async_trait]
impl TokenListProvider for EmptyTokenList {
    async fn fetch(&self) -> Result<Vec<TokenListEntry>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct CacheState {
    entries: Arc<Vec<TokenListEntry>>,
    fetched_at: Option<Instant>,
}

/// 代币列表缓存
///
/// 由 [`TokenResolver`] 持有；并发刷新时后写者覆盖前者。
pub struct RegistryCache {
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl RegistryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// 预置缓存内容（刷新时间记为当前时刻）
    pub async fn seed(&self, entries: Vec<TokenListEntry>) {
        self.store(Arc::new(entries)).await;
    }

    async fn store(&self, entries: Arc<Vec<TokenListEntry>>) {
        let mut state = self.state.write().await;
        state.entries = entries;
        state.fetched_at = Some(Instant::now());
    }

    /// 缓存为空或超过 TTL 时返回 None
    async fn fresh(&self) -> Option<Arc<Vec<TokenListEntry>>> {
        let state = self.state.read().await;
        match state.fetched_at {
            Some(at) if !state.entries.is_empty() && at.elapsed() <= self.ttl => {
                Some(state.entries.clone())
            }
            _ => None,
        }
    }
}

/// 代币解析器：原生代币 → 地址 → 符号/名称
pub struct TokenResolver {
    native_symbol: String,
    erc20: Erc20Client,
    provider: Arc<dyn TokenListProvider>,
    cache: Arc<RegistryCache>,
}

impl TokenResolver {
    pub fn new(
        native_symbol: impl Into<String>,
        erc20: Erc20Client,
        provider: Arc<dyn TokenListProvider>,
        cache: Arc<RegistryCache>,
    ) -> Self {
        Self {
            native_symbol: native_symbol.into(),
            erc20,
            provider,
            cache,
        }
    }

    /// 把符号、名称、地址或原生代币标记解析为代币描述
    #[instrument(skip(self))]
    pub async fn resolve(&self, identifier: &str, chain_id: u64) -> Result<TokenDescriptor> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(TradingError::invalid("代币标识不能为空"));
        }

        if identifier.eq_ignore_ascii_case(&self.native_symbol) {
            return Ok(TokenDescriptor::native(chain_id, &self.native_symbol));
        }

        if let Some(address) = parse_address(identifier) {
            return self.resolve_address(address, chain_id).await;
        }

        let registry = self.registry().await;
        let on_chain = || registry.iter().filter(|entry| entry.chain_id == chain_id);

        on_chain()
            .find(|entry| entry.symbol.eq_ignore_ascii_case(identifier))
            .or_else(|| on_chain().find(|entry| entry.name.eq_ignore_ascii_case(identifier)))
            .map(TokenListEntry::descriptor)
            .ok_or_else(|| TradingError::TokenNotFound(identifier.to_string()))
    }

    /// 地址解析：先查列表，再读链上元数据
    pub async fn resolve_address(&self, address: Address, chain_id: u64) -> Result<TokenDescriptor> {
        let registry = self.registry().await;
        if let Some(entry) = registry
            .iter()
            .find(|entry| entry.chain_id == chain_id && entry.address == address)
        {
            return Ok(entry.descriptor());
        }

        match self.erc20.metadata(address).await {
            Ok(meta) => {
                debug!(token = %address, symbol = %meta.symbol, "通过链上读取解析代币");
                Ok(TokenDescriptor {
                    chain_id,
                    address: Some(address),
                    decimals: meta.decimals,
                    symbol: meta.symbol,
                    name: meta.name,
                })
            }
            Err(e) => {
                warn!(token = %address, error = %e, "链上读取代币信息失败");
                Err(TradingError::TokenNotFound(format!("{:?}", address)))
            }
        }
    }

    /// 取得代币列表；过期时刷新，拉取失败时本次返回空列表
    async fn registry(&self) -> Arc<Vec<TokenListEntry>> {
        if let Some(entries) = self.cache.fresh().await {
            return entries;
        }

        match self.provider.fetch().await {
            Ok(entries) => {
                info!(count = entries.len(), "代币列表已刷新");
                let entries = Arc::new(entries);
                self.cache.store(entries.clone()).await;
                entries
            }
            Err(e) => {
                warn!(error = %e, "代币列表拉取失败，按空列表处理");
                Arc::new(Vec::new())
            }
        }
    }
}

/// 只接受 0x 前缀的 40 位十六进制地址
pub fn parse_address(value: &str) -> Option<Address> {
    let hex = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    hex.parse().ok()
}
