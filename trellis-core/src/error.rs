/// 处理器与协作者统一使用的错误类型
///
/// 业务处理器返回 `anyhow::Result`，任何类型化错误都可以通过 `?` 转换。
/// 分发核心只在错误边界处观察这些错误。
///
/// # 示例
///
/// ```rust,ignore
/// use trellis_core::prelude::*;
///
/// async fn load(tx: &Transaction, id: &str) -> Result<serde_json::Value> {
///     tx.get(id)
///         .await?
///         .ok_or_else(|| anyhow!("note '{}' not found", id))
/// }
/// ```
pub use anyhow::Result;

use thiserror::Error;

use crate::context::ContextError;
use crate::transaction::TransactionError;

/// 框架层错误
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
