//! 合约调用/返回值/事件的静态类型定义
//!
//! 每个链上操作都对应一个强类型结构体，选择器由签名字符串在编译期确定，
//! 不在运行时按名称匹配 ABI。

use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use ethers::abi::{AbiDecode, AbiEncode, RawLog};
use ethers::contract::{EthAbiCodec, EthAbiType, EthCall, EthEvent};
use ethers::types::{Address, Bytes, Log, U256};

// ==================== ERC20 / ERC721 ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "balanceOf", abi = "balanceOf(address)")]
pub struct BalanceOfCall {
    pub account: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "allowance", abi = "allowance(address,address)")]
pub struct AllowanceCall {
    pub owner: Address,
    pub spender: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "approve", abi = "approve(address,uint256)")]
pub struct ApproveCall {
    pub spender: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "transfer", abi = "transfer(address,uint256)")]
pub struct TransferCall {
    pub recipient: Address,
    pub amount: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "decimals", abi = "decimals()")]
pub struct DecimalsCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "symbol", abi = "symbol()")]
pub struct SymbolCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "name", abi = "name()")]
pub struct NameCall;

// ==================== PancakeSwap V2 ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getPair", abi = "getPair(address,address)")]
pub struct GetPairCall {
    pub token_a: Address,
    pub token_b: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getReserves", abi = "getReserves()")]
pub struct GetReservesCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct GetReservesReturn {
    pub reserve_0: u128,
    pub reserve_1: u128,
    pub block_timestamp_last: u32,
}

// ==================== PancakeSwap V3 ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "getPool", abi = "getPool(address,address,uint24)")]
pub struct GetPoolCall {
    pub token_a: Address,
    pub token_b: Address,
    pub fee: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "slot0", abi = "slot0()")]
pub struct Slot0Call;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct Slot0Return {
    pub sqrt_price_x96: U256,
    pub tick: i32,
    pub observation_index: u16,
    pub observation_cardinality: u16,
    pub observation_cardinality_next: u16,
    pub fee_protocol: u32,
    pub unlocked: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "liquidity", abi = "liquidity()")]
pub struct LiquidityCall;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "token0", abi = "token0()")]
pub struct Token0Call;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "token1", abi = "token1()")]
pub struct Token1Call;

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "fee", abi = "fee()")]
pub struct FeeCall;

// ==================== NonfungiblePositionManager ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "tokenOfOwnerByIndex", abi = "tokenOfOwnerByIndex(address,uint256)")]
pub struct TokenOfOwnerByIndexCall {
    pub owner: Address,
    pub index: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "positions", abi = "positions(uint256)")]
pub struct PositionsCall {
    pub token_id: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct PositionsReturn {
    pub nonce: u128,
    pub operator: Address,
    pub token_0: Address,
    pub token_1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub liquidity: u128,
    pub fee_growth_inside_0_last_x128: U256,
    pub fee_growth_inside_1_last_x128: U256,
    pub tokens_owed_0: u128,
    pub tokens_owed_1: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct MintParams {
    pub token_0: Address,
    pub token_1: Address,
    pub fee: u32,
    pub tick_lower: i32,
    pub tick_upper: i32,
    pub amount_0_desired: U256,
    pub amount_1_desired: U256,
    pub amount_0_min: U256,
    pub amount_1_min: U256,
    pub recipient: Address,
    pub deadline: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "mint",
    abi = "mint((address,address,uint24,int24,int24,uint256,uint256,uint256,uint256,address,uint256))"
)]
pub struct MintCall {
    pub params: MintParams,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct DecreaseLiquidityParams {
    pub token_id: U256,
    pub liquidity: u128,
    pub amount_0_min: U256,
    pub amount_1_min: U256,
    pub deadline: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "decreaseLiquidity",
    abi = "decreaseLiquidity((uint256,uint128,uint256,uint256,uint256))"
)]
pub struct DecreaseLiquidityCall {
    pub params: DecreaseLiquidityParams,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct CollectParams {
    pub token_id: U256,
    pub recipient: Address,
    pub amount_0_max: u128,
    pub amount_1_max: u128,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "collect", abi = "collect((uint256,address,uint128,uint128))")]
pub struct CollectCall {
    pub params: CollectParams,
}

/// 退还 mint 时多付的原生代币
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "refundETH", abi = "refundETH()")]
pub struct RefundEthCall;

/// NonfungiblePositionManager.multicall(bytes[])
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "multicall", abi = "multicall(bytes[])")]
pub struct PositionMulticallCall {
    pub data: Vec<Bytes>,
}

// ==================== SmartRouter ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(
    name = "swapExactTokensForTokens",
    abi = "swapExactTokensForTokens(uint256,uint256,address[],address)"
)]
pub struct SwapExactTokensForTokensCall {
    pub amount_in: U256,
    pub amount_out_min: U256,
    pub path: Vec<Address>,
    pub to: Address,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct ExactInputParams {
    pub path: Bytes,
    pub recipient: Address,
    pub amount_in: U256,
    pub amount_out_minimum: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "exactInput", abi = "exactInput((bytes,address,uint256,uint256))")]
pub struct ExactInputCall {
    pub params: ExactInputParams,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "unwrapWETH9", abi = "unwrapWETH9(uint256,address)")]
pub struct UnwrapWeth9Call {
    pub amount_minimum: U256,
    pub recipient: Address,
}

/// SmartRouter.multicall(uint256 deadline, bytes[] data)
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "multicall", abi = "multicall(uint256,bytes[])")]
pub struct RouterMulticallCall {
    pub deadline: U256,
    pub data: Vec<Bytes>,
}

// ==================== QuoterV2 ====================

/// 链上模拟一条 V3 路径的精确输入兑换（非 view，只能通过 eth_call 读取）
#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "quoteExactInput", abi = "quoteExactInput(bytes,uint256)")]
pub struct QuoteExactInputCall {
    pub path: Bytes,
    pub amount_in: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct QuoteExactInputReturn {
    pub amount_out: U256,
    pub sqrt_price_x96_after_list: Vec<U256>,
    pub initialized_ticks_crossed_list: Vec<u32>,
    pub gas_estimate: U256,
}

// ==================== 发币合约 ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "createToken", abi = "createToken(string,string,uint256)")]
pub struct CreateTokenCall {
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
}

/// 发币成功事件，三个字段均非 indexed
#[derive(Clone, Debug, Default, PartialEq, Eq, EthEvent)]
#[ethevent(name = "CreateTokenEvent", abi = "CreateTokenEvent(address,address,uint256)")]
pub struct CreateTokenEvent {
    pub creater: Address,
    pub token: Address,
    pub creater_nonce: U256,
}

// ==================== four.meme ====================

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "tryBuy", abi = "tryBuy(address,uint256,uint256)")]
pub struct TryBuyCall {
    pub token: Address,
    pub amount: U256,
    pub funds: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthAbiType, EthAbiCodec)]
pub struct TryBuyReturn {
    pub token_manager: Address,
    pub quote: Address,
    pub estimated_amount: U256,
    pub estimated_cost: U256,
    pub estimated_fee: U256,
    pub amount_msg_value: U256,
    pub amount_approval: U256,
    pub amount_funds: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "buyTokenAMAP", abi = "buyTokenAMAP(address,uint256,uint256)")]
pub struct BuyTokenAmapCall {
    pub token: Address,
    pub funds: U256,
    pub min_amount: U256,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, EthCall)]
#[ethcall(name = "sellToken", abi = "sellToken(address,uint256)")]
pub struct SellTokenCall {
    pub token: Address,
    pub amount: U256,
}

// ==================== 辅助函数 ====================

/// 执行只读调用并按静态返回类型解码
pub async fn read<C, R>(rpc: &dyn ChainRpc, to: Address, call: C) -> Result<R>
where
    C: EthCall + AbiEncode,
    R: AbiDecode,
{
    let output = rpc.call(to, Bytes::from(call.encode())).await?;
    R::decode(output.as_ref()).map_err(|e| {
        TradingError::Abi(format!(
            "{} 返回值解码失败 ({} 字节): {}",
            C::function_name(),
            output.len(),
            e
        ))
    })
}

/// 在交易回执日志中查找并解码 emitter 发出的指定事件
///
/// 只接受由 emitter 发出且 topic0 与事件签名一致的日志，同一笔交易里
/// 其他合约发出的同名事件被忽略；字段类型或 indexed 标记不符时解码失败。
pub fn decode_event<E: EthEvent>(logs: &[Log], emitter: Address) -> Result<E> {
    let signature = E::signature();
    let log = logs
        .iter()
        .find(|log| log.address == emitter && log.topics.first() == Some(&signature))
        .ok_or_else(|| {
            TradingError::Abi(format!("回执中未找到 {:?} 发出的 {} 事件", emitter, E::name()))
        })?;

    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };
    E::decode_log(&raw).map_err(|e| TradingError::Abi(format!("{} 事件解码失败: {}", E::name(), e)))
}
