//! 兑换路由
//!
//! 以代币为节点、池子为边建图，在跳数上限内做有界的最优优先搜索，
//! 再在互不共用池子的路径之间按固定步长拆分输入，按扣除 Gas 后的输出评分。

pub mod calldata;
pub mod discovery;
pub mod quote;
pub mod quoter;

pub use discovery::discover_candidates;
pub use quoter::requote_trade;
pub use quote::{PoolCandidate, PoolKind};

use crate::error::{Result, TradingError};
use crate::position_math::{Slippage, mul_div};
use ethers::types::{Address, Bytes, U256};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info};

/// 单次搜索最多展开的节点数
const MAX_EXPANSIONS: usize = 2_000;
/// 参与评分的完整路径上限
const MAX_ROUTES: usize = 16;

const BASE_GAS: u64 = 90_000;
const CONSTANT_PRODUCT_HOP_GAS: u64 = 60_000;
const CONCENTRATED_HOP_GAS: u64 = 80_000;
const SPLIT_GAS: u64 = 40_000;

/// 搜索边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_hops: usize,
    pub max_splits: usize,
    /// 拆分比例的最小步长（百分比，需整除 100）
    pub split_step_percent: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_hops: 2,
            max_splits: 2,
            split_step_percent: 25,
        }
    }
}

/// 一条简单路径：tokens[i] 经 pools[i] 换成 tokens[i + 1]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub tokens: Vec<Address>,
    pub pools: Vec<PoolCandidate>,
}

impl Route {
    pub fn hops(&self) -> usize {
        self.pools.len()
    }

    /// 逐跳链式报价
    pub fn quote(&self, amount_in: U256) -> Option<U256> {
        self.pools
            .iter()
            .zip(&self.tokens)
            .try_fold(amount_in, |amount, (pool, token)| pool.quote(*token, amount))
    }

    pub fn gas_units(&self) -> u64 {
        self.pools
            .iter()
            .map(|pool| match pool.kind {
                PoolKind::ConstantProduct => CONSTANT_PRODUCT_HOP_GAS,
                PoolKind::Concentrated { .. } => CONCENTRATED_HOP_GAS,
            })
            .sum()
    }

    fn uses_any(&self, pools: &HashSet<Address>) -> bool {
        self.pools.iter().any(|pool| pools.contains(&pool.address))
    }
}

/// 拆分后的一部分输入及其路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRoute {
    pub route: Route,
    pub amount_in: U256,
    pub amount_out: U256,
}

/// 路由请求。代币均为链上地址，原生代币已映射到包装合约
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub token_in: Address,
    pub token_out: Address,
    pub amount_in: U256,
    pub native_in: bool,
    pub native_out: bool,
    pub recipient: Address,
    pub deadline: U256,
    pub slippage: Slippage,
    pub gas_price: U256,
    pub wrapped_native: Address,
}

/// 选定的交易
#[derive(Debug, Clone)]
pub struct Trade {
    pub splits: Vec<SplitRoute>,
    pub amount_in: U256,
    /// 报价输出（未扣 Gas）
    pub expected_out: U256,
    /// 各拆分滑点下限之和
    pub amount_out_minimum: U256,
    /// 以输出代币计价的 Gas 成本估计
    pub gas_cost: U256,
    pub calldata: Bytes,
    pub value: U256,
}

impl Trade {
    /// 由拆分路径组装交易：逐拆分计算滑点下限，汇总后编码 multicall
    pub fn assemble(request: &TradeRequest, splits: Vec<SplitRoute>, gas_cost: U256) -> Result<Self> {
        let expected_out = checked_total(splits.iter().map(|split| split.amount_out))?;
        let minimums = splits
            .iter()
            .map(|split| request.slippage.min_amount(split.amount_out))
            .collect::<Result<Vec<_>>>()?;
        let amount_out_minimum = checked_total(minimums.iter().copied())?;
        let calldata = calldata::encode_trade(request, &splits, &minimums, amount_out_minimum);

        Ok(Self {
            splits,
            amount_in: request.amount_in,
            expected_out,
            amount_out_minimum,
            gas_cost,
            calldata,
            value: if request.native_in {
                request.amount_in
            } else {
                U256::zero()
            },
        })
    }

    pub fn total_hops(&self) -> usize {
        self.splits.iter().map(|split| split.route.hops()).sum()
    }
}

/// 带溢出检查的求和
fn checked_total(amounts: impl IntoIterator<Item = U256>) -> Result<U256> {
    amounts
        .into_iter()
        .try_fold(U256::zero(), |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| TradingError::invalid("数量合计超出 256 位"))
}

/// 可读的路由摘要（工具输出用）
#[derive(Debug, Clone, Serialize)]
pub struct RouteSummary {
    pub path: Vec<Address>,
    pub pools: Vec<Address>,
    pub pool_kinds: Vec<PoolKind>,
    pub amount_in: String,
    pub amount_out: String,
}

impl From<&SplitRoute> for RouteSummary {
    fn from(split: &SplitRoute) -> Self {
        Self {
            path: split.route.tokens.clone(),
            pools: split.route.pools.iter().map(|pool| pool.address).collect(),
            pool_kinds: split.route.pools.iter().map(|pool| pool.kind).collect(),
            amount_in: split.amount_in.to_string(),
            amount_out: split.amount_out.to_string(),
        }
    }
}

/// 搜索队列中的部分路径
#[derive(Debug, Clone)]
struct SearchNode {
    token: Address,
    amount: U256,
    tokens: Vec<Address>,
    pools: Vec<usize>,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SearchNode {}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SearchNode {
    // 大顶堆：跳数少的优先，其次当前数量大的优先
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .pools
            .len()
            .cmp(&self.pools.len())
            .then_with(|| self.amount.cmp(&other.amount))
    }
}

/// 候选交易方案
#[derive(Debug, Clone)]
struct Plan {
    splits: Vec<SplitRoute>,
    gas_cost: U256,
    score: U256,
    hops: usize,
}

impl Plan {
    /// 分数高者胜，同分时跳数少者胜
    fn beats(&self, other: &Plan) -> bool {
        match self.score.cmp(&other.score) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => (self.hops, self.splits.len()) < (other.hops, other.splits.len()),
        }
    }
}

/// 池子图
struct PoolGraph<'a> {
    pools: &'a [PoolCandidate],
    adjacency: HashMap<Address, Vec<usize>>,
}

impl<'a> PoolGraph<'a> {
    fn new(pools: &'a [PoolCandidate]) -> Self {
        let mut adjacency: HashMap<Address, Vec<usize>> = HashMap::new();
        for (index, pool) in pools.iter().enumerate() {
            if !pool.is_live() {
                continue;
            }
            adjacency.entry(pool.token0).or_default().push(index);
            adjacency.entry(pool.token1).or_default().push(index);
        }
        Self { pools, adjacency }
    }

    /// 有界最优优先搜索，返回按输出降序排列的完整路径
    fn search(&self, from: Address, to: Address, amount_in: U256, max_hops: usize) -> Vec<(Route, U256)> {
        let mut heap = BinaryHeap::new();
        heap.push(SearchNode {
            token: from,
            amount: amount_in,
            tokens: vec![from],
            pools: Vec::new(),
        });

        let mut found: Vec<(Route, U256)> = Vec::new();
        let mut expansions = 0;

        while let Some(node) = heap.pop() {
            if node.token == to {
                found.push((self.route(&node), node.amount));
                if found.len() >= MAX_ROUTES {
                    break;
                }
                continue;
            }
            if node.pools.len() >= max_hops {
                continue;
            }
            expansions += 1;
            if expansions > MAX_EXPANSIONS {
                debug!(expansions = MAX_EXPANSIONS, "路由搜索达到展开上限");
                break;
            }

            let Some(edges) = self.adjacency.get(&node.token) else {
                continue;
            };
            for &index in edges {
                let pool = &self.pools[index];
                let Some(next) = pool.other(node.token) else {
                    continue;
                };
                // 只走简单路径
                if node.tokens.contains(&next) || node.pools.contains(&index) {
                    continue;
                }
                let Some(amount) = pool.quote(node.token, node.amount) else {
                    continue;
                };

                let mut tokens = node.tokens.clone();
                tokens.push(next);
                let mut pools = node.pools.clone();
                pools.push(index);
                heap.push(SearchNode {
                    token: next,
                    amount,
                    tokens,
                    pools,
                });
            }
        }

        found.sort_by(|(a, out_a), (b, out_b)| out_b.cmp(out_a).then(a.hops().cmp(&b.hops())));
        found
    }

    fn route(&self, node: &SearchNode) -> Route {
        Route {
            tokens: node.tokens.clone(),
            pools: node.pools.iter().map(|&i| self.pools[i].clone()).collect(),
        }
    }
}

/// 把 total 按若干份数分给各路径，最后一份取余数
fn allocate(total: U256, shares: &[u32], units: u32) -> Result<Vec<U256>> {
    let mut amounts = Vec::with_capacity(shares.len());
    let mut assigned = U256::zero();
    for (i, share) in shares.iter().enumerate() {
        let amount = if i + 1 == shares.len() {
            total
                .checked_sub(assigned)
                .ok_or_else(|| TradingError::invalid("拆分份额之和超过 100%"))?
        } else {
            mul_div(total, U256::from(*share), U256::from(units))?
        };
        assigned = checked_total([assigned, amount])?;
        amounts.push(amount);
    }
    Ok(amounts)
}

/// units 拆成 parts 个正整数的全部有序组合
fn compositions(units: u32, parts: usize) -> Vec<Vec<u32>> {
    if parts == 0 {
        return Vec::new();
    }
    if parts == 1 {
        return if units > 0 { vec![vec![units]] } else { Vec::new() };
    }
    let mut out = Vec::new();
    for first in 1..units {
        for mut rest in compositions(units - first, parts - 1) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

/// 路由搜索引擎（纯计算，不访问网络）
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteSearchEngine {
    limits: SearchLimits,
}

impl RouteSearchEngine {
    pub fn new(limits: SearchLimits) -> Result<Self> {
        if limits.max_hops == 0 || limits.max_splits == 0 {
            return Err(TradingError::invalid("max_hops 和 max_splits 至少为 1"));
        }
        if limits.split_step_percent == 0 || 100 % limits.split_step_percent != 0 {
            return Err(TradingError::invalid(format!(
                "拆分步长必须整除 100: {}",
                limits.split_step_percent
            )));
        }
        Ok(Self { limits })
    }

    /// 在候选池中选出扣除 Gas 后输出最高的交易
    pub fn find_best_trade(&self, request: &TradeRequest, candidates: &[PoolCandidate]) -> Result<Trade> {
        if request.amount_in.is_zero() {
            return Err(TradingError::invalid("输入数量必须大于 0"));
        }
        if request.token_in == request.token_out {
            return Err(TradingError::invalid("输入与输出代币相同"));
        }

        let graph = PoolGraph::new(candidates);
        let routes = graph.search(
            request.token_in,
            request.token_out,
            request.amount_in,
            self.limits.max_hops,
        );
        if routes.is_empty() {
            return Err(TradingError::NoRouteFound {
                token_in: format!("{:?}", request.token_in),
                token_out: format!("{:?}", request.token_out),
                max_hops: self.limits.max_hops,
            });
        }
        debug!(routes = routes.len(), "找到候选路径");

        let native_rate = self.native_rate(&graph, request);
        let plans = self.plans(&routes, request.amount_in)?;

        let mut best: Option<Plan> = None;
        for (splits, expected_out) in plans {
            let gas_units = BASE_GAS
                + splits.iter().map(|split| split.route.gas_units()).sum::<u64>()
                + SPLIT_GAS * (splits.len() as u64 - 1);
            let gas_wei = request.gas_price.saturating_mul(U256::from(gas_units));
            let gas_cost = match native_rate {
                Some(rate) => mul_div(gas_wei, rate, U256::exp10(18))?,
                None => U256::zero(),
            };
            let plan = Plan {
                hops: splits.iter().map(|split| split.route.hops()).sum(),
                score: expected_out.saturating_sub(gas_cost),
                splits,
                gas_cost,
            };
            if best.as_ref().is_none_or(|current| plan.beats(current)) {
                best = Some(plan);
            }
        }

        let Some(plan) = best else {
            return Err(TradingError::NoRouteFound {
                token_in: format!("{:?}", request.token_in),
                token_out: format!("{:?}", request.token_out),
                max_hops: self.limits.max_hops,
            });
        };

        let trade = Trade::assemble(request, plan.splits, plan.gas_cost)?;
        info!(
            splits = trade.splits.len(),
            hops = plan.hops,
            expected_out = %trade.expected_out,
            gas_cost = %trade.gas_cost,
            amount_out_minimum = %trade.amount_out_minimum,
            "选定兑换路由"
        );
        Ok(trade)
    }

    /// 1 个原生代币可换得的输出代币数量，无法定价时为 None
    fn native_rate(&self, graph: &PoolGraph<'_>, request: &TradeRequest) -> Option<U256> {
        let one = U256::exp10(18);
        if request.token_out == request.wrapped_native {
            return Some(one);
        }
        let rate = graph
            .search(request.wrapped_native, request.token_out, one, self.limits.max_hops)
            .first()
            .map(|(_, out)| *out);
        if rate.is_none() {
            debug!("无法为 Gas 成本定价，按 0 计算");
        }
        rate
    }

    /// 单路径方案 + 互不相交路径间的拆分方案
    fn plans(&self, routes: &[(Route, U256)], amount_in: U256) -> Result<Vec<(Vec<SplitRoute>, U256)>> {
        let mut plans: Vec<(Vec<SplitRoute>, U256)> = routes
            .iter()
            .map(|(route, out)| {
                let split = SplitRoute {
                    route: route.clone(),
                    amount_in,
                    amount_out: *out,
                };
                (vec![split], *out)
            })
            .collect();

        if self.limits.max_splits < 2 {
            return Ok(plans);
        }

        let mut disjoint: Vec<&Route> = Vec::new();
        let mut used = HashSet::new();
        for (route, _) in routes {
            if disjoint.len() >= self.limits.max_splits {
                break;
            }
            if route.uses_any(&used) {
                continue;
            }
            used.extend(route.pools.iter().map(|pool| pool.address));
            disjoint.push(route);
        }

        let units = 100 / self.limits.split_step_percent;
        for parts in 2..=disjoint.len() {
            for shares in compositions(units, parts) {
                let amounts = allocate(amount_in, &shares, units)?;
                let quoted: Option<Vec<SplitRoute>> = disjoint[..parts]
                    .iter()
                    .zip(amounts)
                    .map(|(route, amount)| {
                        route.quote(amount).map(|out| SplitRoute {
                            route: (*route).clone(),
                            amount_in: amount,
                            amount_out: out,
                        })
                    })
                    .collect();
                if let Some(splits) = quoted {
                    let total = checked_total(splits.iter().map(|split| split.amount_out))?;
                    plans.push((splits, total));
                }
            }
        }
        Ok(plans)
    }
}
