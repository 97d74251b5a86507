//! MCP 工具层
//!
//! 每个文件定义一组工具的请求参数（JSON Schema 由 schemars 生成），
//! 工具实现本身在 `server` 中直接调用 `TradingEngine`。

pub mod balance;
pub mod contract;
pub mod liquidity;
pub mod meme;
pub mod swap;
pub mod token;
pub mod transfer;

use crate::error::{ErrorKind, Result, TradingError};
use rmcp::{
    model::{CallToolResult, Content},
    ErrorData as McpError,
};
use serde::Serialize;
use tracing::warn;

/// 流程结果 → 工具结果
///
/// 成功时返回格式化 JSON。失败时返回 MCP 错误：InvalidInput 对应
/// invalid_params，其余类别对应 internal_error；消息以错误类别开头，
/// data 中同时给出 kind 与 message。
pub fn respond<T: Serialize>(result: Result<T>) -> Result<CallToolResult, McpError> {
    match result {
        Ok(value) => {
            let json = serde_json::to_string_pretty(&value)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            Ok(CallToolResult::success(vec![Content::text(json)]))
        }
        Err(err) => {
            warn!(kind = ?err.kind(), error = %err, "工具调用失败");
            Err(to_mcp_error(&err))
        }
    }
}

pub fn to_mcp_error(err: &TradingError) -> McpError {
    let kind = kind_name(err.kind());
    let message = format!("{}: {}", kind, err);
    let data = Some(serde_json::json!({
        "kind": kind,
        "message": err.to_string(),
    }));
    match err.kind() {
        ErrorKind::InvalidInput => McpError::invalid_params(message, data),
        _ => McpError::internal_error(message, data),
    }
}

/// SCREAMING_SNAKE_CASE 形式的类别名
fn kind_name(kind: ErrorKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| format!("{:?}", kind))
}
