use crate::erc20::{self, Erc20Client};
use crate::error::{Result, TradingError};
use crate::tx::TxSubmitter;
use crate::types::{TokenDescriptor, TxReference};
use ethers::types::{Address, U256};
use tracing::{debug, info, instrument, warn};

/// 授权检查：额度不足时发起最大额度 approve 并等待确认
#[derive(Clone)]
pub struct AllowanceGuard {
    erc20: Erc20Client,
    submitter: TxSubmitter,
}

impl AllowanceGuard {
    pub fn new(erc20: Erc20Client, submitter: TxSubmitter) -> Self {
        Self { erc20, submitter }
    }

    /// 确保 spender 可以从签名账户转出至少 `required` 数量的代币
    ///
    /// 原生代币直接返回。发起了 approve 时返回该交易引用；approve 确认后
    /// 额度仍然不足（代币截断了授权数量）时返回 InsufficientAllowance。
    #[instrument(skip(self, token), fields(symbol = %token.symbol))]
    pub async fn ensure_allowance(
        &self,
        token: &TokenDescriptor,
        spender: Address,
        required: U256,
    ) -> Result<Option<TxReference>> {
        let Some(token_address) = token.address else {
            return Ok(None);
        };
        let owner = self.submitter.signer_address();

        let current = self.erc20.allowance(token_address, owner, spender).await?;
        if current >= required {
            debug!(current = %current, required = %required, "授权额度充足");
            return Ok(None);
        }

        info!(
            spender = %spender,
            current = %current,
            required = %required,
            "授权额度不足，发起 approve"
        );
        let call = erc20::approve_call(token_address, spender, U256::MAX);
        let reference = self.submitter.execute(&call).await?;
        info!(tx_hash = ?reference.hash, "approve 已确认");

        let granted = self.erc20.allowance(token_address, owner, spender).await?;
        if granted < required {
            warn!(granted = %granted, required = %required, "approve 后额度仍然不足");
            return Err(TradingError::InsufficientAllowance {
                symbol: token.symbol.clone(),
                required: erc20::format_units(required, token.decimals),
                current: erc20::format_units(granted, token.decimals),
            });
        }
        Ok(Some(reference))
    }
}
