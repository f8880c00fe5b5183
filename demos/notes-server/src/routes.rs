//! 路由注册
//!
//! 注册顺序即匹配顺序：固定路径放在同前缀的参数路径之前。

use axum::{response::Html, routing::get, Router};
use trellis_web::{Method, PathSpec, RouteTableBuilder};

use crate::api::{notes, sync, transfer, tree};

pub fn register(builder: RouteTableBuilder) -> RouteTableBuilder {
    builder
        .api(Method::GET, "/api/tree", tree::get_tree)
        .api(Method::PUT, "/api/tree/:branchId/set-prefix", tree::set_prefix)
        .api(Method::PUT, "/api/tree/:branchId/expanded/:expanded", tree::set_expanded)
        .api(Method::DELETE, "/api/tree/:branchId", tree::delete_branch)
        .api(Method::GET, "/api/notes/:noteId", notes::get_note)
        .api(Method::PUT, "/api/notes/:noteId", notes::update_note)
        .api(Method::POST, "/api/notes/:parentNoteId/children", notes::create_note)
        .api(
            Method::PUT,
            PathSpec::pattern(r"/api/notes/(.*)/type/(.*)/mime/(.*)"),
            notes::set_note_type_mime,
        )
        .api(Method::GET, "/api/recent-changes", notes::recent_changes)
        .api(Method::GET, "/api/sync/check", sync::check_sync)
        .api(Method::POST, "/api/sync/force-full-sync", sync::force_full_sync)
        .api(Method::POST, "/api/sync/force-note-sync/:noteId", sync::force_note_sync)
        .api(Method::GET, "/api/sync/changed", sync::get_changed)
        .http_api(Method::GET, "/api/export/:noteId", transfer::export_note)
        .http_api(Method::POST, "/api/import/:parentNoteId", transfer::import_notes)
}

/// 页面路由，不经过分发核心
pub fn pages() -> Router {
    Router::new()
        .route("/", get(|| async { Html("<h1>Notes</h1>") }))
        .route("/login", get(|| async { Html("<form method=\"post\"></form>") }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use axum::{body::Body, extract::Request};
    use trellis_core::{MemoryStore, RequestContext, TransactionCoordinator};
    use trellis_web::{AuthMiddleware, Dispatcher, FileBodyMiddleware, StatusCode};

    use crate::sync_log;

    fn table() -> trellis_web::RouteTable {
        register(
            RouteTableBuilder::new()
                .with_auth(Arc::new(AuthMiddleware::disabled()))
                .with_file_body(Arc::new(FileBodyMiddleware::default())),
        )
        .build()
        .unwrap()
    }

    async fn fetch(dispatcher: &Dispatcher, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = dispatcher.dispatch(request).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_route_table_builds() {
        let table = table();

        assert!(table.find(&Method::GET, "/api/tree").is_some());
        let (route, captures) = table
            .find(&Method::PUT, "/api/notes/n1/type/code/mime/text%2Fx-rust")
            .unwrap();
        assert!(matches!(route.spec(), PathSpec::Pattern(_)));
        assert_eq!(captures.at(2), Some("text/x-rust"));
    }

    #[tokio::test]
    async fn test_own_changes_are_not_echoed() {
        let coordinator = TransactionCoordinator::new(Arc::new(MemoryStore::new()));

        for device in ["deviceA", "deviceB"] {
            RequestContext::new(device)
                .scope(coordinator.in_transaction(|tx| async move {
                    sync_log::record(&tx, "notes", device).await?;
                    Ok(())
                }))
                .await
                .unwrap();
        }

        let changes = RequestContext::new("deviceA")
            .scope(coordinator.in_transaction(|tx| async move {
                sync_log::changed_since(&tx, 0).await
            }))
            .await
            .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].source_id.as_deref(), Some("deviceB"));
    }

    #[tokio::test]
    async fn test_invalid_last_sync_id_is_bad_request() {
        let store = MemoryStore::new();
        let dispatcher = Dispatcher::new(
            Arc::new(table()),
            TransactionCoordinator::new(Arc::new(store.clone())),
        );

        let (status, body) = fetch(&dispatcher, "/api/sync/changed?lastSyncId=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid lastSyncId 'abc'"));
        // 预期内的失败照常提交空事务
        assert_eq!(store.commit_count(), 1);

        let (status, body) = fetch(&dispatcher, "/api/sync/changed?lastSyncId=0").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "[]");
    }
}
