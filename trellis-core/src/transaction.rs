//! 事务协调器
//!
//! 每次分发开启恰好一个工作单元：处理器正常完成时提交，处理器或提交失败时回滚。
//! 状态机为 `Active → Committed` 或 `Active → RolledBack`，两者都是终态。
//!
//! 处理器拿到的 [`Transaction`] 只能读写，提交与回滚只能经由
//! [`TransactionCoordinator`] 完成。每次读写之前都会重新检查状态，
//! 因此事务结束后处理器遗留的句柄无法再写入任何数据。

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::store::{Store, StoreError, StoreTransaction};

/// 事务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Active => write!(f, "active"),
            TransactionState::Committed => write!(f, "committed"),
            TransactionState::RolledBack => write!(f, "rolled back"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction {id} is {state}")]
    Closed { id: u64, state: TransactionState },

    #[error("failed to begin transaction: {0}")]
    Begin(#[source] StoreError),

    #[error("failed to commit transaction {id}: {source}")]
    Commit {
        id: u64,
        #[source]
        source: StoreError,
    },

    #[error("failed to roll back transaction {id}: {source}")]
    Rollback {
        id: u64,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode value for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type TransactionResult<T> = Result<T, TransactionError>;

struct TransactionSlot {
    state: TransactionState,
    inner: Option<Box<dyn StoreTransaction>>,
}

/// 处理器可见的事务句柄
///
/// 克隆得到的是同一个事务。挂起点之间句柄不会被其它请求共享，
/// 因为每次分发都会开启自己的事务。
#[derive(Clone)]
pub struct Transaction {
    id: u64,
    slot: Arc<Mutex<TransactionSlot>>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction").field("id", &self.id).finish()
    }
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn state(&self) -> TransactionState {
        self.slot.lock().await.state
    }

    pub async fn get(&self, key: &str) -> TransactionResult<Option<Value>> {
        let mut slot = self.slot.lock().await;
        let tx = Self::active(self.id, &mut slot)?;
        Ok(tx.get(key).await?)
    }

    /// 读取并反序列化；值不存在时返回 `None`
    pub async fn get_as<T>(&self, key: &str) -> anyhow::Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn put(&self, key: &str, value: Value) -> TransactionResult<()> {
        let mut slot = self.slot.lock().await;
        let tx = Self::active(self.id, &mut slot)?;
        Ok(tx.put(key, value).await?)
    }

    /// 序列化后写入
    pub async fn put_as<T>(&self, key: &str, value: &T) -> TransactionResult<()>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|source| TransactionError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.put(key, value).await
    }

    pub async fn delete(&self, key: &str) -> TransactionResult<()> {
        let mut slot = self.slot.lock().await;
        let tx = Self::active(self.id, &mut slot)?;
        Ok(tx.delete(key).await?)
    }

    pub async fn keys(&self, prefix: &str) -> TransactionResult<Vec<String>> {
        let mut slot = self.slot.lock().await;
        let tx = Self::active(self.id, &mut slot)?;
        Ok(tx.keys(prefix).await?)
    }

    fn active<'a>(
        id: u64,
        slot: &'a mut TransactionSlot,
    ) -> TransactionResult<&'a mut Box<dyn StoreTransaction>> {
        let state = slot.state;
        match slot.inner.as_mut() {
            Some(tx) if state == TransactionState::Active => Ok(tx),
            _ => Err(TransactionError::Closed { id, state }),
        }
    }
}

/// 事务协调器
///
/// 唯一能开启、提交、回滚事务的组件。
#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn Store>,
    next_id: Arc<AtomicU64>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// 开启事务
    pub async fn begin(&self) -> TransactionResult<Transaction> {
        let inner = self.store.begin().await.map_err(TransactionError::Begin)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(tx = id, store = self.store.name(), "Transaction begun");

        Ok(Transaction {
            id,
            slot: Arc::new(Mutex::new(TransactionSlot {
                state: TransactionState::Active,
                inner: Some(inner),
            })),
        })
    }

    /// 提交事务，仅在 Active 状态下有效
    ///
    /// 存储提交失败时事务进入 RolledBack。
    pub async fn commit(&self, tx: &Transaction) -> TransactionResult<()> {
        let mut slot = tx.slot.lock().await;
        if slot.state != TransactionState::Active {
            return Err(TransactionError::Closed {
                id: tx.id,
                state: slot.state,
            });
        }

        let inner = slot.inner.take().ok_or(TransactionError::Closed {
            id: tx.id,
            state: slot.state,
        })?;

        match inner.commit().await {
            Ok(()) => {
                slot.state = TransactionState::Committed;
                tracing::debug!(tx = tx.id, "Transaction committed");
                Ok(())
            }
            Err(source) => {
                slot.state = TransactionState::RolledBack;
                tracing::debug!(tx = tx.id, error = %source, "Transaction commit failed");
                Err(TransactionError::Commit { id: tx.id, source })
            }
        }
    }

    /// 回滚事务
    ///
    /// 已处于终态时什么也不做，返回当前状态。
    pub async fn rollback(&self, tx: &Transaction) -> TransactionResult<TransactionState> {
        let mut slot = tx.slot.lock().await;
        if slot.state.is_terminal() {
            return Ok(slot.state);
        }

        slot.state = TransactionState::RolledBack;
        if let Some(inner) = slot.inner.take() {
            inner
                .rollback()
                .await
                .map_err(|source| TransactionError::Rollback { id: tx.id, source })?;
        }

        tracing::debug!(tx = tx.id, "Transaction rolled back");
        Ok(TransactionState::RolledBack)
    }

    /// 在一个工作单元内运行 `f`
    ///
    /// 用于 HTTP 分发之外的后台任务。`f` 返回错误或提交失败时回滚并返回错误。
    pub async fn in_transaction<F, Fut, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let tx = self.begin().await?;

        match f(tx.clone()).await {
            Ok(value) => match self.commit(&tx).await {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback(&tx).await?;
                    Err(e.into())
                }
            },
            Err(e) => {
                if let Err(rollback_err) = self.rollback(&tx).await {
                    tracing::error!(tx = tx.id, error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}
