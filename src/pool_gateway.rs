use crate::contracts::{
    self, FeeCall, GetPairCall, GetPoolCall, GetReservesCall, GetReservesReturn, LiquidityCall,
    Slot0Call, Slot0Return, Token0Call, Token1Call,
};
use crate::error::{Result, TradingError};
use crate::eth_client::ChainRpc;
use crate::types::PoolState;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{debug, instrument};

/// V2 交易对快照（储备量按 token0/token1 排列）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairState {
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub reserve0: U256,
    pub reserve1: U256,
}

impl PairState {
    /// 以 token_in 为输入方向的 (reserve_in, reserve_out)
    pub fn reserves_for(&self, token_in: Address) -> Option<(U256, U256)> {
        if token_in == self.token0 {
            Some((self.reserve0, self.reserve1))
        } else if token_in == self.token1 {
            Some((self.reserve1, self.reserve0))
        } else {
            None
        }
    }
}

/// 按地址排序，工厂合约以此确定 token0/token1
pub fn sort_tokens(a: Address, b: Address) -> (Address, Address) {
    if a < b { (a, b) } else { (b, a) }
}

/// 池子状态读取网关
///
/// 只读；每次调用都重新读取链上状态，不做跨调用缓存。
#[derive(Clone)]
pub struct PoolGateway {
    rpc: Arc<dyn ChainRpc>,
    v2_factory: Address,
    v3_factory: Address,
}

impl PoolGateway {
    pub fn new(rpc: Arc<dyn ChainRpc>, v2_factory: Address, v3_factory: Address) -> Self {
        Self {
            rpc,
            v2_factory,
            v3_factory,
        }
    }

    /// 查询集中流动性池地址，工厂返回零地址时报 PoolNotFound
    #[instrument(skip(self))]
    pub async fn find_pool(&self, token_a: Address, token_b: Address, fee_tier: u32) -> Result<Address> {
        let pool: Address = contracts::read(
            self.rpc.as_ref(),
            self.v3_factory,
            GetPoolCall {
                token_a,
                token_b,
                fee: fee_tier,
            },
        )
        .await?;

        if pool.is_zero() {
            return Err(TradingError::PoolNotFound(format!(
                "{:?}/{:?} 费率 {}",
                token_a, token_b, fee_tier
            )));
        }
        debug!(pool = %pool, fee_tier = fee_tier, "找到 V3 池");
        Ok(pool)
    }

    /// 并发读取池子的代币、费率、slot0 和流动性
    #[instrument(skip(self))]
    pub async fn read_state(&self, pool: Address) -> Result<PoolState> {
        let rpc = self.rpc.as_ref();
        let (token0, token1, fee_tier, slot0, liquidity) = tokio::try_join!(
            contracts::read::<_, Address>(rpc, pool, Token0Call),
            contracts::read::<_, Address>(rpc, pool, Token1Call),
            contracts::read::<_, u32>(rpc, pool, FeeCall),
            contracts::read::<_, Slot0Return>(rpc, pool, Slot0Call),
            contracts::read::<_, u128>(rpc, pool, LiquidityCall),
        )?;

        debug!(
            pool = %pool,
            tick = slot0.tick,
            liquidity = liquidity,
            "读取池子状态"
        );

        Ok(PoolState {
            address: pool,
            token0,
            token1,
            fee_tier,
            sqrt_price_x96: slot0.sqrt_price_x96,
            current_tick: slot0.tick,
            liquidity,
        })
    }

    /// find_pool + read_state
    pub async fn pool_state(&self, token_a: Address, token_b: Address, fee_tier: u32) -> Result<PoolState> {
        let pool = self.find_pool(token_a, token_b, fee_tier).await?;
        self.read_state(pool).await
    }

    /// 查询 V2 交易对地址，不存在时返回 None
    #[instrument(skip(self))]
    pub async fn find_pair(&self, token_a: Address, token_b: Address) -> Result<Option<Address>> {
        let pair: Address = contracts::read(
            self.rpc.as_ref(),
            self.v2_factory,
            GetPairCall { token_a, token_b },
        )
        .await?;
        Ok((!pair.is_zero()).then_some(pair))
    }

    /// 读取 V2 交易对储备量
    #[instrument(skip(self))]
    pub async fn read_pair(&self, pair: Address, token_a: Address, token_b: Address) -> Result<PairState> {
        let reserves: GetReservesReturn =
            contracts::read(self.rpc.as_ref(), pair, GetReservesCall).await?;
        let (token0, token1) = sort_tokens(token_a, token_b);

        debug!(
            pair = %pair,
            reserve0 = reserves.reserve_0,
            reserve1 = reserves.reserve_1,
            "获取到储备量"
        );

        Ok(PairState {
            address: pair,
            token0,
            token1,
            reserve0: U256::from(reserves.reserve_0),
            reserve1: U256::from(reserves.reserve_1),
        })
    }
}
