use super::PoolCandidate;
use crate::error::{Result, TradingError};
use crate::pool_gateway::PoolGateway;
use crate::tick_math;
use ethers::types::Address;
use futures::stream::{self, StreamExt};
use std::iter;
use tracing::{debug, instrument, warn};

/// 参与建图的代币两两组合
fn token_pairs(token_in: Address, token_out: Address, base_tokens: &[Address]) -> Vec<(Address, Address)> {
    let mut tokens = vec![token_in, token_out];
    for base in base_tokens {
        if !tokens.contains(base) {
            tokens.push(*base);
        }
    }

    let mut pairs = Vec::new();
    for (i, a) in tokens.iter().enumerate() {
        for b in &tokens[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

/// 单个池子的查找
#[derive(Debug, Clone, Copy)]
enum Lookup {
    ConstantProduct(Address, Address),
    Concentrated(Address, Address, u32),
}

impl Lookup {
    /// 池子不存在时为 None
    async fn run(self, gateway: &PoolGateway) -> Result<Option<PoolCandidate>> {
        match self {
            Lookup::ConstantProduct(a, b) => {
                let Some(pair) = gateway.find_pair(a, b).await? else {
                    return Ok(None);
                };
                let state = gateway.read_pair(pair, a, b).await?;
                Ok(Some(PoolCandidate::constant_product(&state)))
            }
            Lookup::Concentrated(a, b, fee) => match gateway.pool_state(a, b, fee).await {
                Ok(state) => Ok(Some(PoolCandidate::concentrated(&state))),
                Err(TradingError::PoolNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }
}

/// 发现 V2 与 V3 两类候选池
///
/// 候选范围是 {输入, 输出, 基础代币} 的两两组合，V3 遍历全部费率档位。
/// 同时进行的查找不超过 concurrency 个。不存在或没有流动性的池子被跳过；
/// 单个池子读取失败只记录警告，全部失败且没有任何候选时才返回错误。
#[instrument(skip(gateway, base_tokens))]
pub async fn discover_candidates(
    gateway: &PoolGateway,
    token_in: Address,
    token_out: Address,
    base_tokens: &[Address],
    concurrency: usize,
) -> Result<Vec<PoolCandidate>> {
    let pairs = token_pairs(token_in, token_out, base_tokens);
    let lookups: Vec<Lookup> = pairs
        .iter()
        .flat_map(|&(a, b)| {
            iter::once(Lookup::ConstantProduct(a, b))
                .chain(tick_math::fee_tiers().map(move |fee| Lookup::Concentrated(a, b, fee)))
        })
        .collect();
    let total = lookups.len();

    let results: Vec<(Lookup, Result<Option<PoolCandidate>>)> = stream::iter(lookups)
        .map(|lookup| async move { (lookup, lookup.run(gateway).await) })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut candidates = Vec::new();
    let mut failures = 0;
    let mut last_error = None;
    for (lookup, result) in results {
        match result {
            Ok(Some(candidate)) if candidate.is_live() => candidates.push(candidate),
            Ok(_) => {}
            Err(e) => {
                warn!(?lookup, error = %e, "池子读取失败，跳过");
                failures += 1;
                last_error = Some(e);
            }
        }
    }

    if candidates.is_empty() {
        if let Some(e) = last_error {
            return Err(e);
        }
    }

    debug!(
        pairs = pairs.len(),
        lookups = total,
        failures,
        candidates = candidates.len(),
        "候选池发现完成"
    );
    Ok(candidates)
}
