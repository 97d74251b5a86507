use ethers::types::H256;
use serde::Serialize;

/// 错误类别（对外暴露给工具调用方）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    TokenNotFound,
    PoolNotFound,
    NoRouteFound,
    InsufficientBalance,
    InsufficientAllowance,
    TransactionReverted,
    ConfirmationTimeout,
    InvalidInput,
    Rpc,
    Abi,
    Signer,
    TokenList,
}

/// 交易引擎统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum TradingError {
    #[error("未找到代币: {0}")]
    TokenNotFound(String),

    #[error("未找到流动性池: {0}")]
    PoolNotFound(String),

    #[error("在 {max_hops} 跳内找不到 {token_in} -> {token_out} 的交易路径")]
    NoRouteFound {
        token_in: String,
        token_out: String,
        max_hops: usize,
    },

    #[error("{symbol} 余额不足: 需要 {required}，当前 {available}")]
    InsufficientBalance {
        symbol: String,
        required: String,
        available: String,
    },

    #[error("{symbol} 授权额度不足: 需要 {required}，当前 {current}")]
    InsufficientAllowance {
        symbol: String,
        required: String,
        current: String,
    },

    #[error("交易已回滚: {0:?}")]
    TransactionReverted(H256),

    #[error("等待交易确认超时（{attempts} 次轮询）: {hash:?}，请稍后按哈希查询")]
    ConfirmationTimeout { hash: H256, attempts: u32 },

    #[error("无效的输入: {0}")]
    InvalidInput(String),

    #[error("RPC 错误: {0}")]
    Rpc(String),

    #[error("ABI 编码/解码错误: {0}")]
    Abi(String),

    #[error("签名器错误: {0}")]
    Signer(String),

    #[error("代币列表错误: {0}")]
    TokenList(String),
}

impl TradingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TradingError::TokenNotFound(_) => ErrorKind::TokenNotFound,
            TradingError::PoolNotFound(_) => ErrorKind::PoolNotFound,
            TradingError::NoRouteFound { .. } => ErrorKind::NoRouteFound,
            TradingError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            TradingError::InsufficientAllowance { .. } => ErrorKind::InsufficientAllowance,
            TradingError::TransactionReverted(_) => ErrorKind::TransactionReverted,
            TradingError::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            TradingError::InvalidInput(_) => ErrorKind::InvalidInput,
            TradingError::Rpc(_) => ErrorKind::Rpc,
            TradingError::Abi(_) => ErrorKind::Abi,
            TradingError::Signer(_) => ErrorKind::Signer,
            TradingError::TokenList(_) => ErrorKind::TokenList,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        TradingError::InvalidInput(msg.into())
    }
}

impl From<ethers::providers::ProviderError> for TradingError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        TradingError::Rpc(err.to_string())
    }
}

impl From<ethers::abi::Error> for TradingError {
    fn from(err: ethers::abi::Error) -> Self {
        TradingError::Abi(err.to_string())
    }
}

impl From<ethers::abi::AbiError> for TradingError {
    fn from(err: ethers::abi::AbiError) -> Self {
        TradingError::Abi(err.to_string())
    }
}

pub type Result<T, E = TradingError> = std::result::Result<T, E>;
