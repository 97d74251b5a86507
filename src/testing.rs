//! 测试用内存链
//!
//! 同时实现 RPC、签名器和代币列表三个协作方，按选择器应答强类型合约读取，
//! 记录所有已广播交易，并让 approve/transfer 立即生效。

use crate::config::Config;
use crate::contracts::*;
use crate::engine::TradingEngine;
use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use crate::position_math::mul_div;
use crate::routing::PoolCandidate;
use crate::signer::TxSigner;
use crate::token_registry::{TokenListEntry, TokenListProvider};
use crate::types::PoolState;
use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H160, H256, Log, TransactionReceipt, U64, U256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const WBNB: Address = H160([0xbb; 20]);
pub const V2_FACTORY: Address = H160([0xf2; 20]);
pub const V3_FACTORY: Address = H160([0xf3; 20]);
pub const POSITION_MANAGER: Address = H160([0x46; 20]);
pub const SMART_ROUTER: Address = H160([0x5a; 20]);
pub const QUOTER: Address = H160([0x9a; 20]);
pub const TOKEN_CREATOR: Address = H160([0xc0; 20]);
pub const MEME_HELPER: Address = H160([0x4e; 20]);
pub const MEME_MANAGER: Address = H160([0x4d; 20]);

pub const CHAIN_ID: u64 = 56;

/// Hardhat 默认测试账户 #0
pub const SIGNER: Address = H160([
    0xf3, 0x9f, 0xd6, 0xe5, 0x1a, 0xad, 0x88, 0xf6, 0xf4, 0xce, 0x6a, 0xb8, 0x82, 0x72, 0x79,
    0xcf, 0xff, 0xb9, 0x22, 0x66,
]);

pub fn one_ether() -> U256 {
    U256::exp10(18)
}

#[derive(Debug, Clone)]
struct MockToken {
    symbol: String,
    name: String,
    decimals: u8,
    listed: bool,
}

#[derive(Debug, Clone, Copy)]
struct MockPool {
    token0: Address,
    token1: Address,
    fee: u32,
    sqrt_price_x96: U256,
    tick: i32,
    liquidity: u128,
}

#[derive(Default)]
struct ChainState {
    next_address: u64,
    tokens: HashMap<Address, MockToken>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    native: HashMap<Address, U256>,
    pairs: HashMap<(Address, Address), Address>,
    reserves: HashMap<Address, (u128, u128)>,
    pools: HashMap<(Address, Address, u32), Address>,
    pool_states: HashMap<Address, MockPool>,
    positions: Vec<(U256, Address, PositionsReturn)>,
    canned: HashMap<(Address, [u8; 4]), Bytes>,
    failing: HashSet<Address>,
    /// 部分代币把 approve 数量截断到上限
    approval_cap: Option<U256>,
    sent: Vec<TypedTransaction>,
    receipts: HashMap<H256, TransactionReceipt>,
    pending_polls: HashMap<H256, u32>,
    next_logs: Vec<Log>,
    revert_next: bool,
    never_confirm: bool,
    fail_estimate: bool,
    confirm_after: u32,
    receipt_polls: u32,
    gas_estimate: U256,
    gas_price: U256,
    /// 链上报价相对单区间估算的比例（基点）
    quoter_ratio_bps: u64,
    quoter_calls: u32,
}

pub struct MockChain {
    state: Mutex<ChainState>,
}

fn sorted(a: Address, b: Address) -> (Address, Address) {
    if a < b { (a, b) } else { (b, a) }
}

fn ok<T: AbiEncode>(value: T) -> Result<Bytes> {
    Ok(Bytes::from(value.encode()))
}

fn revert(msg: &str) -> TradingError {
    TradingError::Rpc(format!("execution reverted: {}", msg))
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        let mut state = ChainState {
            gas_estimate: U256::from(100_000u64),
            gas_price: U256::from(3_000_000_000u64),
            quoter_ratio_bps: 10_000,
            ..Default::default()
        };
        state.native.insert(SIGNER, one_ether() * 10);
        state.tokens.insert(
            WBNB,
            MockToken {
                symbol: "WBNB".to_string(),
                name: "Wrapped BNB".to_string(),
                decimals: 18,
                listed: true,
            },
        );
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().unwrap()
    }

    pub fn signer_address(&self) -> Address {
        SIGNER
    }

    fn fresh_address(state: &mut ChainState) -> Address {
        state.next_address += 1;
        Address::from_low_u64_be(0x1000 + state.next_address)
    }

    fn insert_token(&self, symbol: &str, name: &str, decimals: u8, listed: bool) -> Address {
        let mut state = self.lock();
        let address = Self::fresh_address(&mut state);
        state.tokens.insert(
            address,
            MockToken {
                symbol: symbol.to_string(),
                name: name.to_string(),
                decimals,
                listed,
            },
        );
        address
    }

    /// 部署代币并登记到代币列表
    pub fn add_token(&self, symbol: &str, name: &str, decimals: u8) -> Address {
        self.insert_token(symbol, name, decimals, true)
    }

    /// 部署代币但不出现在代币列表中（只能通过链上读取解析）
    pub fn add_unlisted_token(&self, symbol: &str, name: &str, decimals: u8) -> Address {
        self.insert_token(symbol, name, decimals, false)
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        self.lock().balances.insert((token, owner), amount);
    }

    pub fn balance(&self, token: Address, owner: Address) -> U256 {
        self.lock()
            .balances
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_native_balance(&self, owner: Address, amount: U256) {
        self.lock().native.insert(owner, amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.lock().allowances.insert((token, owner, spender), amount);
    }

    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
        self.lock()
            .allowances
            .get(&(token, owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// 创建 V2 交易对，储备量按调用顺序给出
    pub fn add_v2_pair(&self, a: Address, b: Address, reserve_a: u128, reserve_b: u128) -> Address {
        let mut state = self.lock();
        let pair = Self::fresh_address(&mut state);
        let (token0, token1) = sorted(a, b);
        state.pairs.insert((token0, token1), pair);
        let reserves = if token0 == a {
            (reserve_a, reserve_b)
        } else {
            (reserve_b, reserve_a)
        };
        state.reserves.insert(pair, reserves);
        pair
    }

    /// 创建 V3 池（价格以 token0/token1 排序后的方向给出）
    pub fn add_v3_pool(
        &self,
        a: Address,
        b: Address,
        fee: u32,
        sqrt_price_x96: U256,
        tick: i32,
        liquidity: u128,
    ) -> Address {
        let mut state = self.lock();
        let pool = Self::fresh_address(&mut state);
        let (token0, token1) = sorted(a, b);
        state.pools.insert((token0, token1, fee), pool);
        state.pool_states.insert(
            pool,
            MockPool {
                token0,
                token1,
                fee,
                sqrt_price_x96,
                tick,
                liquidity,
            },
        );
        pool
    }

    /// 移动池子价格
    pub fn set_pool_price(&self, pool: Address, sqrt_price_x96: U256, tick: i32) {
        if let Some(state) = self.lock().pool_states.get_mut(&pool) {
            state.sqrt_price_x96 = sqrt_price_x96;
            state.tick = tick;
        }
    }

    pub fn add_position(&self, owner: Address, position: PositionsReturn) -> U256 {
        let mut state = self.lock();
        let id = U256::from(state.positions.len() + 1);
        state.positions.push((id, owner, position));
        id
    }

    /// 为指定合约的某个选择器设置固定返回值
    pub fn set_call_result(&self, to: Address, selector: [u8; 4], output: Vec<u8>) {
        self.lock().canned.insert((to, selector), Bytes::from(output));
    }

    /// 之后对该地址的所有只读调用都以 RPC 错误失败
    pub fn fail_calls_to(&self, address: Address) {
        self.lock().failing.insert(address);
    }

    /// 下一笔交易的回执附带这些日志
    pub fn push_receipt_logs(&self, logs: Vec<Log>) {
        self.lock().next_logs = logs;
    }

    pub fn cap_approvals(&self, cap: U256) {
        self.lock().approval_cap = Some(cap);
    }

    pub fn revert_next_tx(&self) {
        self.lock().revert_next = true;
    }

    pub fn never_confirm(&self) {
        self.lock().never_confirm = true;
    }

    pub fn fail_gas_estimate(&self) {
        self.lock().fail_estimate = true;
    }

    /// 回执在被轮询 `polls` 次之后才出现
    pub fn confirm_after(&self, polls: u32) {
        self.lock().confirm_after = polls;
    }

    pub fn set_gas_estimate(&self, gas: U256) {
        self.lock().gas_estimate = gas;
    }

    pub fn set_gas_price(&self, price: U256) {
        self.lock().gas_price = price;
    }

    /// QuoterV2 按估算值的这一比例应答，模拟跨 tick 后的真实成交
    pub fn set_quoter_ratio_bps(&self, bps: u64) {
        self.lock().quoter_ratio_bps = bps;
    }

    pub fn quoter_calls(&self) -> u32 {
        self.lock().quoter_calls
    }

    pub fn sent_transactions(&self) -> Vec<TypedTransaction> {
        self.lock().sent.clone()
    }

    /// 已广播交易的 (目标地址, 选择器) 序列
    pub fn sent_calls(&self) -> Vec<(Address, [u8; 4])> {
        self.lock()
            .sent
            .iter()
            .map(|tx| {
                let to = tx.to_addr().copied().unwrap_or_default();
                let mut selector = [0u8; 4];
                if let Some(data) = tx.data() {
                    if data.len() >= 4 {
                        selector.copy_from_slice(&data[..4]);
                    }
                }
                (to, selector)
            })
            .collect()
    }

    pub fn approvals_sent(&self) -> usize {
        self.sent_calls()
            .iter()
            .filter(|(_, selector)| *selector == ApproveCall::selector())
            .count()
    }

    pub fn receipt_polls(&self) -> u32 {
        self.lock().receipt_polls
    }

    fn answer(&self, to: Address, data: &[u8]) -> Result<Bytes> {
        if data.len() < 4 {
            return Err(revert("calldata too short"));
        }
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);

        let mut state = self.lock();
        if state.failing.contains(&to) {
            return Err(TradingError::Rpc("429 Too Many Requests".to_string()));
        }
        if let Some(output) = state.canned.get(&(to, selector)) {
            return Ok(output.clone());
        }

        if selector == QuoteExactInputCall::selector() {
            if to != QUOTER {
                return Err(revert("not the quoter"));
            }
            let call = QuoteExactInputCall::decode(data)?;
            state.quoter_calls += 1;
            return Self::quote_path(&state, call.path.as_ref(), call.amount_in)
                .and_then(|amount_out| {
                    ok(QuoteExactInputReturn {
                        amount_out,
                        ..Default::default()
                    })
                });
        }

        let token = state.tokens.get(&to);

        if selector == BalanceOfCall::selector() {
            let call = BalanceOfCall::decode(data)?;
            if to == POSITION_MANAGER {
                let count = state
                    .positions
                    .iter()
                    .filter(|(_, owner, _)| *owner == call.account)
                    .count();
                return ok(U256::from(count));
            }
            token.ok_or_else(|| revert("not a token"))?;
            ok(state
                .balances
                .get(&(to, call.account))
                .copied()
                .unwrap_or_default())
        } else if selector == AllowanceCall::selector() {
            let call = AllowanceCall::decode(data)?;
            token.ok_or_else(|| revert("not a token"))?;
            ok(state
                .allowances
                .get(&(to, call.owner, call.spender))
                .copied()
                .unwrap_or_default())
        } else if selector == DecimalsCall::selector() {
            ok(token.ok_or_else(|| revert("not a token"))?.decimals)
        } else if selector == SymbolCall::selector() {
            ok(token.ok_or_else(|| revert("not a token"))?.symbol.clone())
        } else if selector == NameCall::selector() {
            ok(token.ok_or_else(|| revert("not a token"))?.name.clone())
        } else if selector == GetPairCall::selector() {
            if to != V2_FACTORY {
                return Err(revert("not the v2 factory"));
            }
            let call = GetPairCall::decode(data)?;
            let key = sorted(call.token_a, call.token_b);
            ok(state.pairs.get(&key).copied().unwrap_or_default())
        } else if selector == GetReservesCall::selector() {
            let (reserve_0, reserve_1) = state
                .reserves
                .get(&to)
                .copied()
                .ok_or_else(|| revert("not a pair"))?;
            ok(GetReservesReturn {
                reserve_0,
                reserve_1,
                block_timestamp_last: 0,
            })
        } else if selector == GetPoolCall::selector() {
            if to != V3_FACTORY {
                return Err(revert("not the v3 factory"));
            }
            let call = GetPoolCall::decode(data)?;
            let (a, b) = sorted(call.token_a, call.token_b);
            ok(state.pools.get(&(a, b, call.fee)).copied().unwrap_or_default())
        } else if selector == Slot0Call::selector() {
            let pool = state.pool_states.get(&to).ok_or_else(|| revert("not a pool"))?;
            ok(Slot0Return {
                sqrt_price_x96: pool.sqrt_price_x96,
                tick: pool.tick,
                unlocked: true,
                ..Default::default()
            })
        } else if selector == LiquidityCall::selector() {
            let pool = state.pool_states.get(&to).ok_or_else(|| revert("not a pool"))?;
            ok(pool.liquidity)
        } else if selector == Token0Call::selector() {
            let pool = state.pool_states.get(&to).ok_or_else(|| revert("not a pool"))?;
            ok(pool.token0)
        } else if selector == Token1Call::selector() {
            let pool = state.pool_states.get(&to).ok_or_else(|| revert("not a pool"))?;
            ok(pool.token1)
        } else if selector == FeeCall::selector() {
            let pool = state.pool_states.get(&to).ok_or_else(|| revert("not a pool"))?;
            ok(pool.fee)
        } else if selector == TokenOfOwnerByIndexCall::selector() {
            let call = TokenOfOwnerByIndexCall::decode(data)?;
            let id = state
                .positions
                .iter()
                .filter(|(_, owner, _)| *owner == call.owner)
                .nth(call.index.as_usize())
                .map(|(id, _, _)| *id)
                .ok_or_else(|| revert("index out of bounds"))?;
            ok(id)
        } else if selector == PositionsCall::selector() {
            let call = PositionsCall::decode(data)?;
            let position = state
                .positions
                .iter()
                .find(|(id, _, _)| *id == call.token_id)
                .map(|(_, _, position)| position.clone())
                .ok_or_else(|| revert("invalid token id"))?;
            ok(position)
        } else {
            Err(revert("unknown selector"))
        }
    }

    /// 逐跳用池子当前状态估算，再乘以 quoter_ratio_bps
    fn quote_path(state: &ChainState, path: &[u8], amount_in: U256) -> Result<U256> {
        let mut amount = amount_in;
        let mut offset = 0;
        while offset + 43 <= path.len() {
            let token_in = Address::from_slice(&path[offset..offset + 20]);
            let fee = u32::from_be_bytes([0, path[offset + 20], path[offset + 21], path[offset + 22]]);
            let token_out = Address::from_slice(&path[offset + 23..offset + 43]);
            let (a, b) = sorted(token_in, token_out);
            let address = state
                .pools
                .get(&(a, b, fee))
                .copied()
                .ok_or_else(|| revert("pool missing"))?;
            let pool = state
                .pool_states
                .get(&address)
                .copied()
                .ok_or_else(|| revert("pool missing"))?;
            let candidate = PoolCandidate::concentrated(&PoolState {
                address,
                token0: pool.token0,
                token1: pool.token1,
                fee_tier: pool.fee,
                sqrt_price_x96: pool.sqrt_price_x96,
                current_tick: pool.tick,
                liquidity: pool.liquidity,
            });
            let out = candidate
                .quote(token_in, amount)
                .ok_or_else(|| revert("no liquidity"))?;
            amount = mul_div(out, U256::from(state.quoter_ratio_bps), U256::from(10_000u64))?;
            offset += 23;
        }
        Ok(amount)
    }

    fn apply_effects(state: &mut ChainState, tx: &TypedTransaction) {
        let to = tx.to_addr().copied().unwrap_or_default();
        let value = tx.value().copied().unwrap_or_default();
        if !value.is_zero() {
            let balance = state.native.entry(SIGNER).or_default();
            *balance = balance.saturating_sub(value);
            *state.native.entry(to).or_default() += value;
        }

        let Some(data) = tx.data() else { return };
        if let Ok(call) = ApproveCall::decode(data.as_ref()) {
            let amount = state.approval_cap.map_or(call.amount, |cap| call.amount.min(cap));
            state.allowances.insert((to, SIGNER, call.spender), amount);
        } else if let Ok(call) = TransferCall::decode(data.as_ref()) {
            let from = state.balances.entry((to, SIGNER)).or_default();
            *from = from.saturating_sub(call.amount);
            *state.balances.entry((to, call.recipient)).or_default() += call.amount;
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.answer(to, data.as_ref())
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> Result<U256> {
        let state = self.lock();
        if state.fail_estimate {
            return Err(revert("gas estimation failed"));
        }
        Ok(state.gas_estimate)
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.lock().gas_price)
    }

    async fn native_balance(&self, address: Address) -> Result<U256> {
        Ok(self.lock().native.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TransactionReceipt>> {
        let mut state = self.lock();
        state.receipt_polls += 1;
        if let Some(remaining) = state.pending_polls.get_mut(&hash) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(state.receipts.get(&hash).cloned())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(CHAIN_ID)
    }
}

#[async_trait]
impl TxSigner for MockChain {
    fn address(&self) -> Address {
        SIGNER
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> Result<H256> {
        let mut state = self.lock();
        state.sent.push(tx.clone());
        let nonce = state.sent.len() as u64;
        let hash = H256::from_low_u64_be(nonce);

        let reverted = std::mem::take(&mut state.revert_next);
        if !reverted {
            Self::apply_effects(&mut state, &tx);
        }

        if !state.never_confirm {
            let logs = std::mem::take(&mut state.next_logs);
            let receipt = TransactionReceipt {
                transaction_hash: hash,
                status: Some(U64::from(if reverted { 0 } else { 1 })),
                block_number: Some(U64::from(1_000 + nonce)),
                gas_used: Some(U256::from(90_000u64)),
                logs,
                ..Default::default()
            };
            state.receipts.insert(hash, receipt);
            let delay = state.confirm_after;
            state.pending_polls.insert(hash, delay);
        }
        Ok(hash)
    }
}

#[async_trait]
impl TokenListProvider for MockChain {
    async fn fetch(&self) -> Result<Vec<TokenListEntry>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .filter(|(_, token)| token.listed)
            .map(|(address, token)| TokenListEntry {
                chain_id: CHAIN_ID,
                address: *address,
                symbol: token.symbol.clone(),
                name: token.name.clone(),
                decimals: token.decimals,
            })
            .collect())
    }
}

/// 固定内容的代币列表，记录拉取次数
pub struct StaticTokenList {
    entries: Vec<TokenListEntry>,
    fetches: AtomicUsize,
}

impl StaticTokenList {
    pub fn new(entries: Vec<TokenListEntry>) -> Arc<Self> {
        Arc::new(Self {
            entries,
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenListProvider for StaticTokenList {
    async fn fetch(&self) -> Result<Vec<TokenListEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.clone())
    }
}

/// 总是失败的代币列表
#[derive(Default)]
pub struct FailingTokenList {
    fetches: AtomicUsize,
}

impl FailingTokenList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenListProvider for FailingTokenList {
    async fn fetch(&self) -> Result<Vec<TokenListEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(TradingError::TokenList("connection refused".to_string()))
    }
}

pub fn entry(address: Address, symbol: &str, name: &str, decimals: u8) -> TokenListEntry {
    TokenListEntry {
        chain_id: CHAIN_ID,
        address,
        symbol: symbol.to_string(),
        name: name.to_string(),
        decimals,
    }
}

/// 指向内存链合约地址的配置，确认轮询间隔缩短到 1ms
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.chain.chain_id = CHAIN_ID;
    config.chain.wrapped_native = WBNB;
    config.pancake.v2_factory = V2_FACTORY;
    config.pancake.v3_factory = V3_FACTORY;
    config.pancake.position_manager = POSITION_MANAGER;
    config.pancake.smart_router = SMART_ROUTER;
    config.pancake.quoter = QUOTER;
    config.pancake.base_tokens = vec![WBNB];
    config.contracts.token_creator = TOKEN_CREATOR;
    config.contracts.meme_helper = MEME_HELPER;
    config.contracts.meme_token_manager = MEME_MANAGER;
    config.trading.confirmation_retries = 5;
    config.trading.confirmation_delay_ms = 1;
    config
}

/// 以内存链作为全部协作方的交易引擎
pub fn engine(chain: &Arc<MockChain>) -> TradingEngine {
    engine_with_config(chain, test_config())
}

pub fn engine_with_config(chain: &Arc<MockChain>, config: Config) -> TradingEngine {
    TradingEngine::new(
        Arc::new(config),
        chain.clone(),
        Some(chain.clone() as Arc<dyn TxSigner>),
        chain.clone(),
    )
}
