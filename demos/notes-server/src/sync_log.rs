//! 变更记录
//!
//! 每次写入实体时追加一条同步记录，标记发起请求的来源标识。
//! 拉取变更时跳过调用方自己产生的记录，避免把它的写入回送给它。

use serde::{Deserialize, Serialize};
use trellis_core::prelude::*;

const SEQ_KEY: &str = "meta/sync-seq";
const PREFIX: &str = "sync/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub id: u64,
    pub entity_name: String,
    pub entity_id: String,
    pub source_id: Option<String>,
}

/// 记录一次实体变更，来源取自当前请求上下文
pub async fn record(tx: &Transaction, entity_name: &str, entity_id: &str) -> Result<u64> {
    let source = RequestContext::current()?;
    let id = tx.get_as::<u64>(SEQ_KEY).await?.unwrap_or(0) + 1;

    let entry = SyncEntry {
        id,
        entity_name: entity_name.to_string(),
        entity_id: entity_id.to_string(),
        source_id: source.source().map(str::to_string),
    };
    tx.put_as(&format!("{}{:010}", PREFIX, id), &entry).await?;
    tx.put_as(SEQ_KEY, &id).await?;

    tracing::debug!(sync_id = id, entity = entity_name, entity_id, "Entity change recorded");
    Ok(id)
}

/// `last_sync_id` 之后、不是由当前调用方发起的变更
pub async fn changed_since(tx: &Transaction, last_sync_id: u64) -> Result<Vec<SyncEntry>> {
    let mut changes = Vec::new();

    for key in tx.keys(PREFIX).await? {
        let Some(entry) = tx.get_as::<SyncEntry>(&key).await? else {
            continue;
        };
        if entry.id <= last_sync_id {
            continue;
        }
        if RequestContext::is_self_originated(entry.source_id.as_deref())? {
            continue;
        }
        changes.push(entry);
    }

    Ok(changes)
}

pub async fn max_sync_id(tx: &Transaction) -> Result<u64> {
    Ok(tx.get_as::<u64>(SEQ_KEY).await?.unwrap_or(0))
}
