use serde_json::{json, Value};
use trellis_core::prelude::*;
use trellis_web::{HandlerResult, RouteRequest, StatusCode};

use crate::sync_log;

/// GET /api/sync/check
pub async fn check_sync(_req: RouteRequest, tx: Transaction) -> Result<Value> {
    Ok(json!({
        "maxSyncId": sync_log::max_sync_id(&tx).await?,
        "sourceId": RequestContext::source_id()?,
    }))
}

/// GET /api/sync/changed?lastSyncId=N
///
/// 返回调用方上次同步之后、由其它来源产生的变更。
pub async fn get_changed(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let last_sync_id = match req.query_param("lastSyncId") {
        Some(raw) => match raw.parse::<u64>() {
            Ok(id) => id,
            Err(_) => {
                return Ok(HandlerResult::StatusAndBody(
                    StatusCode::BAD_REQUEST,
                    json!({ "message": format!("Invalid lastSyncId '{}'", raw) }),
                ))
            }
        },
        None => 0,
    };

    let changes = sync_log::changed_since(&tx, last_sync_id).await?;
    Ok(HandlerResult::Value(serde_json::to_value(changes)?))
}

/// POST /api/sync/force-full-sync
pub async fn force_full_sync(_req: RouteRequest, tx: Transaction) -> Result<()> {
    tx.put("options/lastSyncedPull", json!(0)).await?;
    tx.put("options/lastSyncedPush", json!(0)).await?;
    tracing::info!("Forcing full sync from scratch");
    Ok(())
}

/// POST /api/sync/force-note-sync/:noteId
pub async fn force_note_sync(req: RouteRequest, tx: Transaction) -> Result<()> {
    let note_id = req.param("noteId")?;
    if tx.get(&format!("notes/{}", note_id)).await?.is_none() {
        bail!("cannot force sync of missing note {}", note_id);
    }
    sync_log::record(&tx, "notes", note_id).await?;
    Ok(())
}
