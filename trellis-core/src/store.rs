//! 数据存储抽象
//!
//! 分发核心只依赖两个 trait：[`Store`] 负责开启工作单元，
//! [`StoreTransaction`] 在工作单元内读写并最终提交或回滚。
//! 查询语言、持久化方式都属于具体存储实现。
//!
//! [`MemoryStore`] 是一个以 JSON 文档为值的内存实现：事务内写入先缓冲，
//! 事务内可读到自己的写入，提交时原子应用，回滚时丢弃。
//!
//! 隔离级别为乐观并发：事务记录每个经 `get` 读取的键在读取时的版本，
//! 提交时若其中任一键已被其它事务改写，则以 [`StoreError::Conflict`]
//! 失败且不应用任何写入。`keys` 的前缀扫描不参与校验，未读先写的键
//! 按最后提交者为准。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("write conflict on key '{0}'")]
    Conflict(String),

    #[error("{0}")]
    Other(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 可开启事务的数据存储
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    /// 开启一个新的工作单元
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// 存储层事务
///
/// `commit` 失败时实现必须保证没有任何写入生效。
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get(&mut self, key: &str) -> StoreResult<Option<Value>>;

    async fn put(&mut self, key: &str, value: Value) -> StoreResult<()>;

    async fn delete(&mut self, key: &str) -> StoreResult<()>;

    /// 列出以 `prefix` 开头的键
    async fn keys(&mut self, prefix: &str) -> StoreResult<Vec<String>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// 已提交的文档及其版本；键被删除后版本仍保留
#[derive(Default)]
struct Documents {
    values: BTreeMap<String, Value>,
    versions: HashMap<String, u64>,
}

impl Documents {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }
}

/// 内存存储
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Documents>>,
    commits: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始数据创建
    pub fn with_documents<I, K>(documents: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let store = Self::new();
        {
            let mut data = store.data.write();
            for (key, value) in documents {
                data.values.insert(key.into(), value);
            }
        }
        store
    }

    /// 读取已提交的值，不经过事务
    pub fn committed(&self, key: &str) -> Option<Value> {
        self.data.read().values.get(key).cloned()
    }

    /// 已提交的事务数
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.data.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().values.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            data: Arc::clone(&self.data),
            commits: Arc::clone(&self.commits),
            pending: HashMap::new(),
            reads: HashMap::new(),
        }))
    }
}

/// 内存事务；`pending` 中 `None` 表示待删除，`reads` 记录读取时的版本
struct MemoryTransaction {
    data: Arc<RwLock<Documents>>,
    commits: Arc<AtomicU64>,
    pending: HashMap<String, Option<Value>>,
    reads: HashMap<String, u64>,
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, key: &str) -> StoreResult<Option<Value>> {
        if let Some(pending) = self.pending.get(key) {
            return Ok(pending.clone());
        }
        let data = self.data.read();
        self.reads
            .entry(key.to_string())
            .or_insert_with(|| data.version(key));
        Ok(data.values.get(key).cloned())
    }

    async fn put(&mut self, key: &str, value: Value) -> StoreResult<()> {
        self.pending.insert(key.to_string(), Some(value));
        Ok(())
    }

    async fn delete(&mut self, key: &str) -> StoreResult<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }

    async fn keys(&mut self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .data
            .read()
            .values
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(k, _)| !matches!(self.pending.get(k.as_str()), Some(None)))
            .map(|(k, _)| k.clone())
            .collect();

        for (key, value) in &self.pending {
            if value.is_some() && key.starts_with(prefix) && !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            data,
            commits,
            pending,
            reads,
        } = *self;

        let mut committed = data.write();
        if let Some((key, _)) = reads
            .iter()
            .find(|(key, seen)| committed.version(key) != **seen)
        {
            return Err(StoreError::Conflict(key.clone()));
        }

        for (key, value) in pending {
            *committed.versions.entry(key.clone()).or_insert(0) += 1;
            match value {
                Some(value) => {
                    committed.values.insert(key, value);
                }
                None => {
                    committed.values.remove(&key);
                }
            }
        }
        commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_invisible_until_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();

        tx.put("notes/abc", json!({"title": "Test"})).await.unwrap();
        assert_eq!(tx.get("notes/abc").await.unwrap(), Some(json!({"title": "Test"})));
        assert_eq!(store.committed("notes/abc"), None);

        tx.commit().await.unwrap();
        assert_eq!(store.committed("notes/abc"), Some(json!({"title": "Test"})));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards() {
        let store = MemoryStore::with_documents([("branches/1", json!({"expanded": false}))]);
        let mut tx = store.begin().await.unwrap();

        tx.delete("branches/1").await.unwrap();
        tx.put("branches/2", json!({})).await.unwrap();
        assert_eq!(tx.get("branches/1").await.unwrap(), None);

        tx.rollback().await.unwrap();
        assert!(store.committed("branches/1").is_some());
        assert!(store.committed("branches/2").is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_keys_merge_pending() {
        let store = MemoryStore::with_documents([
            ("notes/a", json!(1)),
            ("notes/b", json!(2)),
            ("options/x", json!(3)),
        ]);
        let mut tx = store.begin().await.unwrap();
        tx.delete("notes/a").await.unwrap();
        tx.put("notes/c", json!(4)).await.unwrap();

        assert_eq!(tx.keys("notes/").await.unwrap(), vec!["notes/b", "notes/c"]);
    }

    #[tokio::test]
    async fn test_stale_read_conflicts_on_commit() {
        let store = MemoryStore::with_documents([("meta/sync-seq", json!(7))]);
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        // 两个事务读到同一个序号并各自加一
        for tx in [&mut first, &mut second] {
            let seq = tx.get("meta/sync-seq").await.unwrap().unwrap();
            let next = seq.as_u64().unwrap() + 1;
            tx.put("meta/sync-seq", json!(next)).await.unwrap();
            tx.put(&format!("sync/{}", next), json!({ "id": next })).await.unwrap();
        }

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref key) if key == "meta/sync-seq"));

        assert_eq!(store.committed("meta/sync-seq"), Some(json!(8)));
        assert_eq!(store.commit_count(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_blind_writes_do_not_conflict() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.put("options/theme", json!("dark")).await.unwrap();
        second.put("options/theme", json!("light")).await.unwrap();
        // 只读到自己的缓冲写入，不记入读集
        assert_eq!(second.get("options/theme").await.unwrap(), Some(json!("light")));

        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(store.committed("options/theme"), Some(json!("light")));
    }
}
