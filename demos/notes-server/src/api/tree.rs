use serde::Deserialize;
use serde_json::{json, Map, Value};
use trellis_core::prelude::*;
use trellis_web::{HandlerResult, RouteRequest, StatusCode};

use crate::sync_log;

fn branch_key(branch_id: &str) -> String {
    format!("branches/{}", branch_id)
}

/// GET /api/tree
pub async fn get_tree(_req: RouteRequest, tx: Transaction) -> Result<Value> {
    let mut branches = Vec::new();
    for key in tx.keys("branches/").await? {
        if let Some(branch) = tx.get(&key).await? {
            branches.push(branch);
        }
    }
    Ok(json!({ "branches": branches }))
}

/// PUT /api/tree/:branchId/expanded/:expanded
pub async fn set_expanded(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let branch_id = req.param("branchId")?;
    let expanded = req.param("expanded")? == "true";
    update_branch(&tx, branch_id, |branch| {
        branch.insert("isExpanded".to_string(), json!(expanded));
    })
    .await
}

#[derive(Deserialize)]
struct SetPrefix {
    prefix: Option<String>,
}

/// PUT /api/tree/:branchId/set-prefix
pub async fn set_prefix(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let branch_id = req.param("branchId")?;
    let body: SetPrefix = req.json()?;
    let prefix = body.prefix.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    update_branch(&tx, branch_id, |branch| {
        branch.insert("prefix".to_string(), json!(prefix));
    })
    .await
}

/// DELETE /api/tree/:branchId
pub async fn delete_branch(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let branch_id = req.param("branchId")?;
    let key = branch_key(branch_id);

    if tx.get(&key).await?.is_none() {
        return Ok(HandlerResult::status(
            StatusCode::NOT_FOUND,
            &json!({ "error": "branch not found" }),
        )?);
    }

    tx.delete(&key).await?;
    sync_log::record(&tx, "branches", branch_id).await?;
    Ok(HandlerResult::NoContent)
}

async fn update_branch<F>(tx: &Transaction, branch_id: &str, update: F) -> Result<HandlerResult>
where
    F: FnOnce(&mut Map<String, Value>),
{
    let key = branch_key(branch_id);
    let Some(Value::Object(mut branch)) = tx.get(&key).await? else {
        return Ok(HandlerResult::status(
            StatusCode::NOT_FOUND,
            &json!({ "error": "branch not found" }),
        )?);
    };

    update(&mut branch);
    tx.put(&key, Value::Object(branch)).await?;
    sync_log::record(tx, "branches", branch_id).await?;
    Ok(HandlerResult::NoContent)
}
