//! 示例笔记服务
//!
//! 在内存存储上注册一组代表性的 API 路由，用来演练分发核心。
//!
//! ```text
//! TRELLIS_AUTH_API_TOKENS=secret cargo run -p notes-server
//! curl -H 'authorization: secret' -H 'source_id: deviceA' localhost:8080/api/tree
//! ```

mod api;
mod routes;
mod sync_log;

use std::sync::Arc;

use serde_json::json;
use trellis_core::{MemoryStore, TransactionCoordinator, TrellisApplication};
use trellis_web::{Dispatcher, RouteTableBuilder, WebServer};

fn seed() -> MemoryStore {
    MemoryStore::with_documents([
        (
            "notes/root",
            json!({ "noteId": "root", "title": "root", "content": "", "type": "text", "mime": "text/html" }),
        ),
        (
            "branches/root",
            json!({ "branchId": "root", "noteId": "root", "parentNoteId": "none", "isExpanded": true, "prefix": null }),
        ),
    ])
}

// 单线程调度器：请求只在挂起点交错
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let env = TrellisApplication::new("notes-server").bootstrap()?;

    let store = seed();
    let coordinator = TransactionCoordinator::new(Arc::new(store));

    let routes = routes::register(RouteTableBuilder::from_environment(&env)).build()?;
    let dispatcher = Dispatcher::from_environment(Arc::new(routes), coordinator, &env);

    WebServer::from_environment(&env, dispatcher)
        .with_router(routes::pages())
        .run()
        .await?;

    Ok(())
}
