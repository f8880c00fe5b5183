use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use trellis_core::prelude::*;
use trellis_web::{HandlerResult, RouteRequest, StatusCode};

use crate::sync_log;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note_id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default = "default_type")]
    pub note_type: String,
    #[serde(default = "default_mime")]
    pub mime: String,
}

fn default_type() -> String {
    "text".to_string()
}

fn default_mime() -> String {
    "text/html".to_string()
}

fn note_key(note_id: &str) -> String {
    format!("notes/{}", note_id)
}

fn not_found(note_id: &str) -> Result<HandlerResult> {
    Ok(HandlerResult::status(
        StatusCode::NOT_FOUND,
        &json!({ "error": format!("note {} not found", note_id) }),
    )?)
}

/// GET /api/notes/:noteId
pub async fn get_note(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let note_id = req.param("noteId")?;
    match tx.get_as::<Note>(&note_key(note_id)).await? {
        Some(note) => Ok(HandlerResult::json(&note)?),
        None => not_found(note_id),
    }
}

#[derive(Deserialize)]
struct UpdateNote {
    title: String,
    #[serde(default)]
    content: String,
}

/// PUT /api/notes/:noteId
pub async fn update_note(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let note_id = req.param("noteId")?;
    let update: UpdateNote = req.json()?;

    let Some(mut note) = tx.get_as::<Note>(&note_key(note_id)).await? else {
        return not_found(note_id);
    };
    note.title = update.title;
    note.content = update.content;

    tx.put_as(&note_key(note_id), &note).await?;
    sync_log::record(&tx, "notes", note_id).await?;
    Ok(HandlerResult::NoContent)
}

#[derive(Deserialize)]
struct CreateNote {
    title: String,
    #[serde(default)]
    content: String,
}

/// POST /api/notes/:parentNoteId/children
pub async fn create_note(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let parent_note_id = req.param("parentNoteId")?;
    if tx.get(&note_key(parent_note_id)).await?.is_none() {
        return not_found(parent_note_id);
    }

    let body: CreateNote = req.json()?;
    let note_id = new_id();
    let branch_id = new_id();

    let note = Note {
        note_id: note_id.clone(),
        title: body.title,
        content: body.content,
        note_type: default_type(),
        mime: default_mime(),
    };
    tx.put_as(&note_key(&note_id), &note).await?;
    tx.put(
        &format!("branches/{}", branch_id),
        json!({
            "branchId": branch_id,
            "noteId": note_id,
            "parentNoteId": parent_note_id,
            "isExpanded": false,
            "prefix": null,
        }),
    )
    .await?;

    sync_log::record(&tx, "notes", &note_id).await?;
    sync_log::record(&tx, "branches", &branch_id).await?;

    Ok(HandlerResult::json(&json!({ "note": note, "branchId": branch_id }))?)
}

/// PUT /api/notes/(.*)/type/(.*)/mime/(.*)
pub async fn set_note_type_mime(req: RouteRequest, tx: Transaction) -> Result<HandlerResult> {
    let note_id = req.capture(0)?;
    let note_type = req.capture(1)?;
    let mime = req.capture(2)?;

    let Some(mut note) = tx.get_as::<Note>(&note_key(note_id)).await? else {
        return not_found(note_id);
    };
    note.note_type = note_type.to_string();
    note.mime = mime.to_string();

    tx.put_as(&note_key(note_id), &note).await?;
    sync_log::record(&tx, "notes", note_id).await?;
    Ok(HandlerResult::NoContent)
}

/// GET /api/recent-changes
pub async fn recent_changes(_req: RouteRequest, tx: Transaction) -> Result<Value> {
    let mut changes = Vec::new();
    for key in tx.keys("sync/").await?.into_iter().rev().take(50) {
        if let Some(change) = tx.get(&key).await? {
            changes.push(change);
        }
    }
    Ok(Value::Array(changes))
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
