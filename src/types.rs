use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

/// 代币描述（解析后不可变）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub chain_id: u64,
    /// 原生代币没有合约地址
    pub address: Option<Address>,
    pub decimals: u8,
    pub symbol: String,
    pub name: String,
}

impl TokenDescriptor {
    /// 创建原生代币描述（BSC 上为 BNB）
    pub fn native(chain_id: u64, symbol: &str) -> Self {
        Self {
            chain_id,
            address: None,
            decimals: 18,
            symbol: symbol.to_uppercase(),
            name: symbol.to_uppercase(),
        }
    }

    /// 判断是否为原生代币
    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }

    /// 用于链上交互的地址，原生代币映射到包装合约（WBNB）
    pub fn wrapped_address(&self, wrapped_native: Address) -> Address {
        self.address.unwrap_or(wrapped_native)
    }
}

/// 最小单位金额，始终为整数
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Amount {
    pub token: TokenDescriptor,
    pub raw: U256,
}

impl Amount {
    pub fn new(token: TokenDescriptor, raw: U256) -> Self {
        Self { token, raw }
    }

    /// 按代币精度格式化（仅用于展示）
    pub fn display(&self) -> String {
        crate::erc20::format_units(self.raw, self.token.decimals)
    }
}

/// 集中流动性池的即时状态，每次调用都重新读取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolState {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub fee_tier: u32,
    /// Q64.96 定点的价格平方根
    pub sqrt_price_x96: U256,
    pub current_tick: i32,
    pub liquidity: u128,
}

/// 头寸价格区间，tick_lower < tick_upper 且均为 tick spacing 的整数倍
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PositionRange {
    pub tick_lower: i32,
    pub tick_upper: i32,
}

/// mint 所需的期望数量与滑点下限
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PositionSizing {
    pub liquidity: u128,
    pub amount0_desired: U256,
    pub amount1_desired: U256,
    pub amount0_min: U256,
    pub amount1_min: U256,
}

/// 链上 LP 头寸（NFT）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub id: U256,
    pub token0: Address,
    pub token1: Address,
    pub fee_tier: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
}

impl Position {
    pub fn range(&self) -> PositionRange {
        PositionRange {
            tick_lower: self.tick_lower,
            tick_upper: self.tick_upper,
        }
    }
}

/// 待提交的合约调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// 日志中使用的调用名称
    pub label: &'static str,
}

impl ContractCall {
    pub fn new(to: Address, data: impl Into<Bytes>, label: &'static str) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::zero(),
            label,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// 已确认交易的引用，供调用方独立核验
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReference {
    pub hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub explorer_url: String,
}

impl TxReference {
    pub fn explorer_link(explorer_base: &str, hash: H256) -> String {
        format!("{}/tx/{:?}", explorer_base.trim_end_matches('/'), hash)
    }
}
