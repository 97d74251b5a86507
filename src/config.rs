use crate::eth_client::mask_rpc_url;
use ethers::types::Address;
use std::env;
use std::str::FromStr;

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 服务器名称
    pub name: String,
    /// 服务器版本
    pub version: String,
    /// 日志级别
    pub log_level: String,
    /// 是否启用 JSON 格式日志
    pub log_json_format: bool,
    /// 日志文件目录（为空时只输出到 stderr）
    pub log_dir: Option<String>,
}

/// 链配置（默认 BNB Smart Chain 主网）
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// RPC 节点地址
    pub rpc_url: Option<String>,
    /// Chain ID
    pub chain_id: u64,
    /// 私钥（用于签名交易，未配置时为只读模式）
    pub private_key: Option<String>,
    /// 原生代币符号
    pub native_symbol: String,
    /// 原生代币的包装合约（WBNB）
    pub wrapped_native: Address,
    /// 区块浏览器地址
    pub explorer_url: String,
}

/// 交易配置
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// 默认滑点容差（基点，50 = 0.5%）
    pub default_slippage_bps: u32,
    /// Gas 估算余量（基点，1000 = 10%）
    pub gas_margin_bps: u32,
    /// 交易截止时间（秒）
    pub deadline_secs: u64,
    /// 路由最大跳数
    pub max_hops: usize,
    /// 路由最大拆分数
    pub max_splits: usize,
    /// 拆分比例步长（百分比）
    pub split_step_percent: u32,
    /// 候选池发现时同时进行的池子读取数
    pub discovery_concurrency: usize,
    /// 回执轮询次数
    pub confirmation_retries: u32,
    /// 回执轮询间隔（毫秒）
    pub confirmation_delay_ms: u64,
    /// 添加流动性时的默认价格下限比例
    pub range_lower_fraction: f64,
    /// 添加流动性时的默认价格上限比例
    pub range_upper_fraction: f64,
    /// 默认费率档位
    pub default_fee_tier: u32,
}

/// PancakeSwap 合约地址
#[derive(Debug, Clone)]
pub struct PancakeConfig {
    pub v2_factory: Address,
    pub v3_factory: Address,
    pub position_manager: Address,
    pub smart_router: Address,
    /// QuoterV2，对选定路由的 V3 段做链上复核报价
    pub quoter: Address,
    /// 路由中间代币
    pub base_tokens: Vec<Address>,
}

/// 代币列表配置
#[derive(Debug, Clone)]
pub struct TokenListConfig {
    /// 代币列表 URL（为空时只依赖链上读取）
    pub url: Option<String>,
    /// 缓存有效期（秒）
    pub ttl_secs: u64,
    /// HTTP 请求超时（秒）
    pub timeout_secs: u64,
}

/// 其它业务合约地址
#[derive(Debug, Clone)]
pub struct ContractsConfig {
    /// 发币合约
    pub token_creator: Address,
    /// four.meme 报价合约
    pub meme_helper: Address,
    /// four.meme 交易合约
    pub meme_token_manager: Address,
}

/// 完整配置
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub chain: ChainConfig,
    pub trading: TradingConfig,
    pub pancake: PancakeConfig,
    pub token_list: TokenListConfig,
    pub contracts: ContractsConfig,
}

fn addr(s: &str) -> Address {
    Address::from_str(s).unwrap_or_default()
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_address(key: &str, default: Address) -> anyhow::Result<Address> {
    match env_string(key) {
        Some(value) => Address::from_str(value.trim())
            .map_err(|e| anyhow::anyhow!("{} 不是有效地址 '{}': {}", key, value, e)),
        None => Ok(default),
    }
}

impl Default for Config {
    fn default() -> Self {
        let wbnb = addr("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c");
        Self {
            server: ServerConfig {
                name: "bsc-trading-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                log_level: "info".to_string(),
                log_json_format: false,
                log_dir: None,
            },
            chain: ChainConfig {
                rpc_url: Some("https://bsc-dataseed.binance.org".to_string()),
                chain_id: 56,
                private_key: None,
                native_symbol: "BNB".to_string(),
                wrapped_native: wbnb,
                explorer_url: "https://bscscan.com".to_string(),
            },
            trading: TradingConfig {
                default_slippage_bps: 50,
                gas_margin_bps: 1_000,
                deadline_secs: 1_200,
                max_hops: 2,
                max_splits: 2,
                split_step_percent: 25,
                discovery_concurrency: 16,
                confirmation_retries: 300,
                confirmation_delay_ms: 100,
                range_lower_fraction: 0.8,
                range_upper_fraction: 1.2,
                default_fee_tier: 2_500,
            },
            pancake: PancakeConfig {
                v2_factory: addr("0xcA143Ce32Fe78f1f7019d7d551a6402fC5350c73"),
                v3_factory: addr("0x0BFbCF9fa4f9C56B0F40a671Ad40E0805A091865"),
                position_manager: addr("0x46A15B0b27311cedF172AB29E4f4766fbE7F4364"),
                smart_router: addr("0x13f4EA83D0bd40E75C8222255bc855a974568Dd4"),
                quoter: addr("0xB048Bbc1Ee6b733FFfCFb9e9CeF7375518e25997"),
                base_tokens: vec![
                    wbnb,
                    // USDT
                    addr("0x55d398326f99059fF775485246999027B3197955"),
                    // USDC
                    addr("0x8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"),
                ],
            },
            token_list: TokenListConfig {
                url: Some("https://tokens.pancakeswap.finance/pancakeswap-extended.json".to_string()),
                ttl_secs: 300,
                timeout_secs: 10,
            },
            contracts: ContractsConfig {
                token_creator: addr("0xad9e6346E87Dfb4c08a47CBDFDF715A700C03918"),
                meme_helper: addr("0xF251F83e40a78868FcfA3FA4599Dad6494E46034"),
                meme_token_manager: addr("0x5c952063c7fc8610FFDB798152D69F0B9550762b"),
            },
        }
    }
}

impl Config {
    /// 从环境变量加载配置，未设置的项使用默认值
    pub fn from_env() -> anyhow::Result<Self> {
        // 尝试加载 .env 文件（如果存在）
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let server = ServerConfig {
            name: env_string("SERVER_NAME").unwrap_or(defaults.server.name),
            version: env_string("SERVER_VERSION").unwrap_or(defaults.server.version),
            log_level: env_string("LOG_LEVEL").unwrap_or(defaults.server.log_level),
            log_json_format: env_parse("LOG_JSON_FORMAT", false),
            log_dir: env_string("LOG_DIR"),
        };

        let chain = ChainConfig {
            rpc_url: env_string("BSC_RPC_URL").or(defaults.chain.rpc_url),
            chain_id: env_parse("CHAIN_ID", defaults.chain.chain_id),
            private_key: env_string("BSC_WALLET_PRIVATE_KEY"),
            native_symbol: env_string("NATIVE_SYMBOL").unwrap_or(defaults.chain.native_symbol),
            wrapped_native: env_address("WRAPPED_NATIVE", defaults.chain.wrapped_native)?,
            explorer_url: env_string("EXPLORER_URL").unwrap_or(defaults.chain.explorer_url),
        };

        let t = &defaults.trading;
        let trading = TradingConfig {
            default_slippage_bps: env_parse("DEFAULT_SLIPPAGE_BPS", t.default_slippage_bps),
            gas_margin_bps: env_parse("GAS_MARGIN_BPS", t.gas_margin_bps),
            deadline_secs: env_parse("DEADLINE_SECS", t.deadline_secs),
            max_hops: env_parse("ROUTE_MAX_HOPS", t.max_hops),
            max_splits: env_parse("ROUTE_MAX_SPLITS", t.max_splits),
            split_step_percent: env_parse("ROUTE_SPLIT_STEP_PERCENT", t.split_step_percent),
            discovery_concurrency: env_parse("ROUTE_DISCOVERY_CONCURRENCY", t.discovery_concurrency),
            confirmation_retries: env_parse("CONFIRMATION_RETRIES", t.confirmation_retries),
            confirmation_delay_ms: env_parse("CONFIRMATION_DELAY_MS", t.confirmation_delay_ms),
            range_lower_fraction: env_parse("RANGE_LOWER_FRACTION", t.range_lower_fraction),
            range_upper_fraction: env_parse("RANGE_UPPER_FRACTION", t.range_upper_fraction),
            default_fee_tier: env_parse("DEFAULT_FEE_TIER", t.default_fee_tier),
        };

        let base_tokens = match env_string("ROUTE_BASE_TOKENS") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    Address::from_str(s)
                        .map_err(|e| anyhow::anyhow!("ROUTE_BASE_TOKENS 包含无效地址 '{}': {}", s, e))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => defaults.pancake.base_tokens.clone(),
        };

        let p = &defaults.pancake;
        let pancake = PancakeConfig {
            v2_factory: env_address("PANCAKE_V2_FACTORY", p.v2_factory)?,
            v3_factory: env_address("PANCAKE_V3_FACTORY", p.v3_factory)?,
            position_manager: env_address("PANCAKE_POSITION_MANAGER", p.position_manager)?,
            smart_router: env_address("PANCAKE_SMART_ROUTER", p.smart_router)?,
            quoter: env_address("PANCAKE_QUOTER", p.quoter)?,
            base_tokens,
        };

        let token_list = TokenListConfig {
            url: match env::var("TOKEN_LIST_URL") {
                // 显式设置为空字符串表示关闭代币列表
                Ok(url) if url.trim().is_empty() => None,
                Ok(url) => Some(url),
                Err(_) => defaults.token_list.url.clone(),
            },
            ttl_secs: env_parse("TOKEN_LIST_TTL_SECS", defaults.token_list.ttl_secs),
            timeout_secs: env_parse("TOKEN_LIST_TIMEOUT_SECS", defaults.token_list.timeout_secs),
        };

        let c = &defaults.contracts;
        let contracts = ContractsConfig {
            token_creator: env_address("TOKEN_CREATOR_CONTRACT", c.token_creator)?,
            meme_helper: env_address("FOUR_MEME_HELPER", c.meme_helper)?,
            meme_token_manager: env_address("FOUR_MEME_TOKEN_MANAGER", c.meme_token_manager)?,
        };

        Ok(Config {
            server,
            chain,
            trading,
            pancake,
            token_list,
            contracts,
        })
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.chain.rpc_url.is_none() {
            anyhow::bail!("必须配置 BSC_RPC_URL");
        }

        // 0-10000 基点，即 0-100%
        if self.trading.default_slippage_bps > 10_000 {
            anyhow::bail!("DEFAULT_SLIPPAGE_BPS 不能超过 10000（100%）");
        }

        if self.trading.confirmation_retries == 0 {
            anyhow::bail!("CONFIRMATION_RETRIES 必须大于 0");
        }

        if !(1..=3).contains(&self.trading.max_hops) {
            anyhow::bail!("ROUTE_MAX_HOPS 必须在 1 到 3 之间");
        }
        if !(1..=3).contains(&self.trading.max_splits) {
            anyhow::bail!("ROUTE_MAX_SPLITS 必须在 1 到 3 之间");
        }

        let step = self.trading.split_step_percent;
        if step == 0 || 100 % step != 0 {
            anyhow::bail!("ROUTE_SPLIT_STEP_PERCENT 必须整除 100");
        }

        if self.trading.discovery_concurrency == 0 {
            anyhow::bail!("ROUTE_DISCOVERY_CONCURRENCY 必须大于 0");
        }

        crate::position_math::check_range_fractions(
            self.trading.range_lower_fraction,
            self.trading.range_upper_fraction,
        )?;

        if crate::tick_math::tick_spacing(self.trading.default_fee_tier).is_err() {
            anyhow::bail!("DEFAULT_FEE_TIER 不是支持的费率档位");
        }

        if self.chain.chain_id != 56 {
            eprintln!(
                "⚠️  警告: Chain ID {} 不是 BSC 主网，请确认合约地址已相应配置",
                self.chain.chain_id
            );
        }

        Ok(())
    }

    /// 打印配置信息（隐藏敏感信息）
    pub fn print_info(&self) {
        eprintln!("📋 配置信息:");
        eprintln!("  服务器名称: {}", self.server.name);
        eprintln!("  服务器版本: {}", self.server.version);
        eprintln!("  日志级别: {}", self.server.log_level);
        eprintln!("  JSON 日志: {}", self.server.log_json_format);
        if let Some(ref dir) = self.server.log_dir {
            eprintln!("  日志目录: {}", dir);
        }

        eprintln!("\n🌐 链:");
        if let Some(ref rpc_url) = self.chain.rpc_url {
            eprintln!("  RPC 节点: {}", mask_rpc_url(rpc_url));
        }
        eprintln!("  Chain ID: {}", self.chain.chain_id);
        eprintln!("  原生代币: {} (包装合约 {:?})", self.chain.native_symbol, self.chain.wrapped_native);
        if self.chain.private_key.is_some() {
            eprintln!("  私钥: ✅ 已配置");
        } else {
            eprintln!("  私钥: ❌ 未配置（只读模式）");
        }

        eprintln!("\n💱 交易配置:");
        eprintln!(
            "  默认滑点: {} bps ({}%)",
            self.trading.default_slippage_bps,
            self.trading.default_slippage_bps as f64 / 100.0
        );
        eprintln!("  Gas 余量: {} bps", self.trading.gas_margin_bps);
        eprintln!(
            "  路由: 最多 {} 跳，{} 路拆分，步长 {}%",
            self.trading.max_hops, self.trading.max_splits, self.trading.split_step_percent
        );
        eprintln!(
            "  确认轮询: {} 次 × {}ms",
            self.trading.confirmation_retries, self.trading.confirmation_delay_ms
        );

        eprintln!("\n🥞 PancakeSwap:");
        eprintln!("  V2 Factory: {:?}", self.pancake.v2_factory);
        eprintln!("  V3 Factory: {:?}", self.pancake.v3_factory);
        eprintln!("  Position Manager: {:?}", self.pancake.position_manager);
        eprintln!("  Smart Router: {:?}", self.pancake.smart_router);
        eprintln!("  Quoter: {:?}", self.pancake.quoter);
        eprintln!("  中间代币: {} 个", self.pancake.base_tokens.len());

        eprintln!("\n📄 代币列表:");
        match self.token_list.url {
            Some(ref url) => eprintln!("  {} (缓存 {}s)", url, self.token_list.ttl_secs),
            None => eprintln!("  未配置（仅链上读取）"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chain.chain_id, 56);
        assert_eq!(config.chain.native_symbol, "BNB");
        assert_eq!(config.trading.default_slippage_bps, 50);
        assert_eq!(config.trading.confirmation_retries, 300);
        assert_eq!(config.trading.confirmation_delay_ms, 100);
        assert_eq!(config.token_list.ttl_secs, 300);
        assert!(!config.chain.wrapped_native.is_zero());
        assert_eq!(config.pancake.base_tokens[0], config.chain.wrapped_native);
    }

    #[test]
    fn test_config_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_slippage_validation() {
        let mut config = Config::default();

        config.trading.default_slippage_bps = 100;
        assert!(config.validate().is_ok());

        config.trading.default_slippage_bps = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_routing_limits_validation() {
        let mut config = Config::default();
        config.trading.max_hops = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.max_splits = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.split_step_percent = 30;
        assert!(config.validate().is_err());

        config.trading.split_step_percent = 20;
        assert!(config.validate().is_ok());

        config.trading.discovery_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_range_fractions_must_bracket_one() {
        let mut config = Config::default();
        config.trading.range_lower_fraction = 1.1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.range_upper_fraction = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_confirmation_retries_rejected() {
        let mut config = Config::default();
        config.trading.confirmation_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fee_tier_validation() {
        let mut config = Config::default();
        config.trading.default_fee_tier = 3000;
        assert!(config.validate().is_err());
    }
}
