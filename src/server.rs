use crate::engine::TradingEngine;
use crate::tools::{
    balance::GetBalanceRequest,
    contract::CallContractRequest,
    liquidity::{AddLiquidityRequest, MyPositionsRequest, RemovePositionRequest},
    meme::{MemeBuyRequest, MemeSellRequest},
    respond,
    swap::SwapRequest,
    token::CreateTokenRequest,
    transfer::{TransferNativeRequest, TransferTokenRequest},
};
use ethers::types::Address;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters, ServerHandler},
    model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde::Serialize;
use std::sync::Arc;

/// 工具名称与一句话说明
const TOOLS: &[(&str, &str)] = &[
    ("get_balance", "查询 BNB 或单个 BEP20 代币余额"),
    ("transfer_native", "转账 BNB"),
    ("transfer_token", "转账 BEP20 代币"),
    ("create_token", "通过发币合约创建 BEP20 代币"),
    ("quote_swap", "PancakeSwap 兑换报价（不发送交易）"),
    ("swap", "通过 PancakeSwap SmartRouter 兑换代币"),
    ("add_liquidity", "在 PancakeSwap V3 添加集中流动性"),
    ("my_positions", "列出 V3 流动性头寸及当前价值"),
    ("remove_position", "按比例移除 V3 头寸流动性并领取代币"),
    ("meme_buy", "在 four.meme 联合曲线上买入代币"),
    ("meme_sell", "把代币卖回 four.meme 联合曲线"),
    ("call_contract", "按 JSON ABI 调用任意合约函数"),
    ("server_info", "显示服务器信息"),
];

#[derive(Debug, Serialize)]
struct ToolInfo {
    name: &'static str,
    description: &'static str,
}

#[derive(Debug, Serialize)]
struct ServerSummary {
    name: String,
    version: String,
    chain_id: u64,
    native_symbol: String,
    /// 只读模式下为空
    signer: Option<Address>,
    default_slippage_bps: u32,
    tools: Vec<ToolInfo>,
}

/// BSC 交易 MCP Server
#[derive(Clone)]
pub struct TradingServer {
    engine: Arc<TradingEngine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TradingServer {
    pub fn new(engine: Arc<TradingEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    pub fn tool_names() -> impl Iterator<Item = &'static str> {
        TOOLS.iter().map(|(name, _)| *name)
    }

    fn summary(&self) -> ServerSummary {
        let config = self.engine.config();
        ServerSummary {
            name: config.server.name.clone(),
            version: config.server.version.clone(),
            chain_id: self.engine.chain_id(),
            native_symbol: config.chain.native_symbol.clone(),
            signer: self.engine.signer_address().ok(),
            default_slippage_bps: config.trading.default_slippage_bps,
            tools: TOOLS
                .iter()
                .map(|(name, description)| ToolInfo { name, description })
                .collect(),
        }
    }

    // ==================== 账户 ====================

    #[tool(description = "查询 BNB 或 BEP20 代币余额。不提供 address 时查询当前钱包；不提供 token 时查询 BNB。token 可以是符号（如 CAKE）或合约地址。")]
    async fn get_balance(
        &self,
        Parameters(request): Parameters<GetBalanceRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .get_balance(request.address.as_deref(), request.token.as_deref())
                .await,
        )
    }

    #[tool(description = "从当前钱包转出 BNB。余额不足时不会发送交易。")]
    async fn transfer_native(
        &self,
        Parameters(request): Parameters<TransferNativeRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .transfer_native(&request.recipient, &request.amount)
                .await,
        )
    }

    #[tool(description = "从当前钱包转出 BEP20 代币。token 可以是符号或合约地址。")]
    async fn transfer_token(
        &self,
        Parameters(request): Parameters<TransferTokenRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .transfer_token(&request.token, &request.recipient, &request.amount)
                .await,
        )
    }

    #[tool(description = "通过发币合约创建新的 BEP20 代币（18 位精度），返回新代币地址。")]
    async fn create_token(
        &self,
        Parameters(request): Parameters<CreateTokenRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .create_token(&request.name, &request.symbol, &request.total_supply)
                .await,
        )
    }

    // ==================== PancakeSwap ====================

    #[tool(description = "在 PancakeSwap V2/V3 池中搜索最优路由（支持多跳和拆单）并返回报价，不发送交易。")]
    async fn quote_swap(
        &self,
        Parameters(request): Parameters<SwapRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .quote_swap(
                    &request.token_in,
                    &request.token_out,
                    &request.amount,
                    request.slippage_bps,
                )
                .await,
        )
    }

    #[tool(description = "通过 PancakeSwap SmartRouter 按最优路由兑换代币。必要时先授权路由合约。BNB 输入/输出自动包装/解包。")]
    async fn swap(
        &self,
        Parameters(request): Parameters<SwapRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.engine
                .swap(
                    &request.token_in,
                    &request.token_out,
                    &request.amount,
                    request.slippage_bps,
                )
                .await,
        )
    }

    #[tool(description = "在 PancakeSwap V3 池中添加集中流动性。区间默认为当前价格的 0.8 到 1.2 倍。")]
    async fn add_liquidity(
        &self,
        Parameters(request): Parameters<AddLiquidityRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.engine.add_liquidity(&request.into()).await)
    }

    #[tool(description = "列出地址持有的 PancakeSwap V3 头寸，包括区间、是否在区间内和按当前价格估算的代币数量。")]
    async fn my_positions(
        &self,
        Parameters(request): Parameters<MyPositionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.engine.my_positions(request.owner.as_deref()).await)
    }

    #[tool(description = "按百分比移除 PancakeSwap V3 头寸的流动性，并把取出的代币和手续费领取到当前钱包。")]
    async fn remove_position(
        &self,
        Parameters(request): Parameters<RemovePositionRequest>,
    ) -> Result<CallToolResult, McpError> {
        let id = match request.id() {
            Ok(id) => id,
            Err(e) => return respond::<()>(Err(e)),
        };
        respond(
            self.engine
                .remove_position(id, request.percent, request.slippage_bps)
                .await,
        )
    }

    // ==================== four.meme ====================

    #[tool(description = "在 four.meme 联合曲线上买入代币。funds（花费的 BNB）和 amount（买入数量）二选一。")]
    async fn meme_buy(
        &self,
        Parameters(request): Parameters<MemeBuyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let sizing = match request.sizing() {
            Ok(sizing) => sizing,
            Err(e) => return respond::<()>(Err(e)),
        };
        respond(self.engine.meme_buy(&request.token, sizing).await)
    }

    #[tool(description = "把代币卖回 four.meme 联合曲线，必要时先授权 token manager。")]
    async fn meme_sell(
        &self,
        Parameters(request): Parameters<MemeSellRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.engine.meme_sell(&request.token, &request.amount).await)
    }

    // ==================== 通用 ====================

    #[tool(description = "按调用方提供的 JSON ABI 调用合约函数。view/pure 函数只读执行并返回解码结果，其余函数签名并发送交易。")]
    async fn call_contract(
        &self,
        Parameters(request): Parameters<CallContractRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.engine.call_contract(&request.into()).await)
    }

    #[tool(description = "获取服务器信息：版本、链、钱包地址和可用工具列表")]
    async fn server_info(&self) -> Result<CallToolResult, McpError> {
        respond(Ok(self.summary()))
    }
}

#[tool_handler]
impl ServerHandler for TradingServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "BSC 链上交易工具：余额、转账、发币、PancakeSwap 兑换与 V3 流动性、four.meme 买卖和通用合约调用。"
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
