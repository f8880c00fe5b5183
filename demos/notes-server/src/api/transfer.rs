//! 导入导出，原始模式路由

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use trellis_core::prelude::*;
use trellis_web::{RouteRequest, StatusCode};

use crate::api::notes::Note;
use crate::sync_log;

/// GET /api/export/:noteId
pub async fn export_note(req: RouteRequest, tx: Transaction) -> Result<Response> {
    let note_id = req.param("noteId")?;
    let Some(note) = tx.get_as::<Note>(&format!("notes/{}", note_id)).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let disposition = format!("attachment; filename=\"{}.json\"", note.note_id);
    Ok((
        [(header::CONTENT_DISPOSITION, disposition)],
        Json(json!({ "version": 1, "notes": [note] })),
    )
        .into_response())
}

/// POST /api/import/:parentNoteId
///
/// 上传的文件是 export 产生的 JSON 文档。
pub async fn import_notes(mut req: RouteRequest, tx: Transaction) -> Result<Response> {
    let parent_note_id = req.param("parentNoteId")?.to_string();
    let Some(file) = req.take_uploaded_file() else {
        return Ok((StatusCode::BAD_REQUEST, "No file was uploaded").into_response());
    };

    if tx.get(&format!("notes/{}", parent_note_id)).await?.is_none() {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    #[derive(serde::Deserialize)]
    struct Export {
        notes: Vec<Note>,
    }
    let export: Export = serde_json::from_slice(&file.data).with_context(|| {
        format!(
            "uploaded file {:?} is not a valid export",
            file.file_name.as_deref().unwrap_or("<unnamed>")
        )
    })?;

    for note in &export.notes {
        tx.put_as(&format!("notes/{}", note.note_id), note).await?;
        tx.put(
            &format!("branches/{}-{}", parent_note_id, note.note_id),
            json!({
                "branchId": format!("{}-{}", parent_note_id, note.note_id),
                "noteId": note.note_id,
                "parentNoteId": parent_note_id,
                "isExpanded": false,
                "prefix": null,
            }),
        )
        .await?;
        sync_log::record(&tx, "notes", &note.note_id).await?;
    }

    tracing::info!(count = export.notes.len(), parent = %parent_note_id, "Imported notes");
    Ok(StatusCode::OK.into_response())
}
