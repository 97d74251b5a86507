//! BNB Smart Chain 交易 MCP Server
//!
//! 核心交易逻辑集中在 [`engine::TradingEngine`]，RPC、签名和代币列表
//! 三个外部协作方通过 trait 注入，[`server::TradingServer`] 把流程暴露为 MCP 工具。

pub mod allowance;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod erc20;
pub mod error;
pub mod eth_client;
pub mod flows;
pub mod logging;
pub mod pool_gateway;
pub mod position_math;
pub mod routing;
pub mod server;
pub mod signer;
pub mod tick_math;
pub mod token_registry;
pub mod tools;
pub mod tx;
pub mod types;

#[cfg(test)]
mod testing;
