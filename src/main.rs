use bsc_trading::{
    config::Config,
    engine::TradingEngine,
    eth_client::{ChainRpc, EthClient},
    logging::init_logging,
    server::TradingServer,
    signer::{TxSigner, WalletSigner},
    token_registry::{EmptyTokenList, HttpTokenList, TokenListProvider},
};
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config.validate()?;

    // guard 存活到进程退出，保证文件日志落盘
    let _log_guard = init_logging(
        &config.server.log_level,
        config.server.log_json_format,
        config.server.log_dir.as_deref(),
    )?;
    config.print_info();

    tracing::info!("🚀 启动 BSC Trading MCP Server...");

    let client = EthClient::new(config.chain.rpc_url.as_deref(), Some(config.chain.chain_id)).await?;
    if !client.is_available() {
        tracing::warn!("节点不可用，所有链上工具都会返回 RPC 错误");
    }

    let signer: Option<Arc<dyn TxSigner>> = match (&config.chain.private_key, client.provider()) {
        (Some(key), Some(provider)) => {
            Some(Arc::new(WalletSigner::new(provider, key, config.chain.chain_id)?))
        }
        (Some(_), None) => {
            tracing::warn!("节点不可用，签名器未启用");
            None
        }
        (None, _) => {
            tracing::warn!("未配置 BSC_WALLET_PRIVATE_KEY，以只读模式运行");
            None
        }
    };

    let token_list: Arc<dyn TokenListProvider> = match &config.token_list.url {
        Some(url) => Arc::new(HttpTokenList::new(
            url.clone(),
            Duration::from_secs(config.token_list.timeout_secs),
        )?),
        None => Arc::new(EmptyTokenList),
    };

    let rpc: Arc<dyn ChainRpc> = Arc::new(client);
    let engine = TradingEngine::new(Arc::new(config), rpc, signer, token_list);
    let server = TradingServer::new(Arc::new(engine));

    tracing::info!(
        tools = ?TradingServer::tool_names().collect::<Vec<_>>(),
        "✅ MCP Server 已就绪，等待客户端连接..."
    );

    let service = server.serve(stdio()).await?;
    let quit_reason = service.waiting().await?;
    tracing::info!("👋 MCP Server 关闭，原因: {:?}", quit_reason);

    Ok(())
}
