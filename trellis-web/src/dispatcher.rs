//! 分发器
//!
//! 一次分发的完整流程：
//!
//! 1. 按注册顺序匹配路由，未匹配返回 404
//! 2. 缓冲请求体并运行中间件管线，任一阶段终止则直接返回，不建立上下文与事务
//! 3. 建立请求上下文
//! 4. 开启事务
//! 5. 调用处理器
//! 6. 正常完成时提交事务、结束上下文，再交给结果编码器（原始模式直接返回处理器的响应）
//!
//! 第 4 步之后的任何失败（包括提交失败与处理器 panic）都会先回滚事务，再由
//! 错误边界生成失败响应。第 3 到 6 步运行在独立任务中，客户端断开连接不会
//! 中止处理器，也不会让事务停留在打开状态。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use http::{header::CONTENT_LENGTH, HeaderMap, HeaderName, StatusCode};
use tracing::Instrument;
use trellis_core::{Environment, RequestContext, TransactionCoordinator};

use crate::boundary::{panic_message, ErrorBoundary};
use crate::constants::*;
use crate::middleware::{run_pipeline, MiddlewareError, PipelineOutcome};
use crate::request::RouteRequest;
use crate::result::ResultEncoder;
use crate::route::{HandlerOutput, RouteHandler, RouteTable};

#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    coordinator: TransactionCoordinator,
    boundary: ErrorBoundary,
    encoder: ResultEncoder,
    source_id_header: HeaderName,
    max_body_size: usize,
}

impl Dispatcher {
    pub fn new(routes: Arc<RouteTable>, coordinator: TransactionCoordinator) -> Self {
        Self {
            routes,
            coordinator,
            boundary: ErrorBoundary::new(),
            encoder: ResultEncoder,
            source_id_header: HeaderName::from_static(DEFAULT_SOURCE_ID_HEADER),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// 从配置读取来源标识请求头与请求体上限
    ///
    /// 配置的请求头名不合法时保留默认值。
    pub fn from_environment(
        routes: Arc<RouteTable>,
        coordinator: TransactionCoordinator,
        env: &Environment,
    ) -> Self {
        let mut dispatcher = Self::new(routes, coordinator);

        if let Some(name) = env.get_string(SERVER_SOURCE_ID_HEADER) {
            match HeaderName::try_from(name.as_str()) {
                Ok(header) => dispatcher.source_id_header = header,
                Err(e) => tracing::warn!(header = %name, error = %e, "Ignoring invalid source id header"),
            }
        }
        if let Some(limit) = env
            .get_i64(SERVER_MAX_BODY_SIZE)
            .and_then(|v| usize::try_from(v).ok())
        {
            dispatcher.max_body_size = limit;
        }

        dispatcher
    }

    pub fn with_source_id_header(mut self, header: HeaderName) -> Self {
        self.source_id_header = header;
        self
    }

    pub fn with_max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    pub async fn dispatch(&self, request: Request) -> Response {
        let (parts, body) = request.into_parts();
        let method = parts.method.clone();
        let path = parts.uri.path().to_string();

        // 分发边界不可重入
        if RequestContext::is_active() {
            return self.boundary.failure(
                &method,
                &path,
                &anyhow::anyhow!("nested dispatch inside an active request context"),
            );
        }

        let Some((route, captures)) = self.routes.find(&method, &path) else {
            tracing::debug!(method = %method, path = %path, "No route matched");
            return StatusCode::NOT_FOUND.into_response();
        };
        tracing::debug!(method = %method, path = %path, route = %route.spec(), "Route matched");

        if content_length(&parts.headers).is_some_and(|len| len > self.max_body_size) {
            return MiddlewareError::PayloadTooLarge.into_response();
        }
        let body = match axum::body::to_bytes(body, self.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(method = %method, path = %path, error = %e, "Failed to read request body");
                return MiddlewareError::BodyParse("Failed to read request body".to_string())
                    .into_response();
            }
        };

        let source_id = parts
            .headers
            .get(&self.source_id_header)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        let mut request = RouteRequest::new(
            parts.method,
            parts.uri,
            parts.headers,
            body,
            Arc::clone(route.spec_str()),
            captures,
        );

        match run_pipeline(route.middleware(), &mut request).await {
            PipelineOutcome::Proceed => {}
            PipelineOutcome::ShortCircuit(response) => return response,
            PipelineOutcome::Failed(e) if e.is_unexpected() => {
                return self.boundary.failure(&method, &path, &anyhow::Error::new(e));
            }
            PipelineOutcome::Failed(e) => return e.into_response(),
        }

        let context = RequestContext::from_header(source_id.as_deref());
        let execution = context.scope(execute(
            self.coordinator.clone(),
            route.handler().clone(),
            request,
        ));

        match tokio::spawn(execution.in_current_span()).await {
            Ok(Ok(HandlerOutput::Encoded(result))) => {
                self.boundary.observe(&method, &path, &result);
                self.encoder.encode(result)
            }
            Ok(Ok(HandlerOutput::Raw(response))) => response,
            Ok(Err(e)) => self.boundary.failure(&method, &path, &e),
            Err(e) => self.boundary.failure(&method, &path, &anyhow::Error::new(e)),
        }
    }
}

/// 在当前请求上下文中执行事务边界内的部分
async fn execute(
    coordinator: TransactionCoordinator,
    handler: RouteHandler,
    request: RouteRequest,
) -> anyhow::Result<HandlerOutput> {
    let tx = coordinator.begin().await?;

    let outcome = match AssertUnwindSafe(handler.call(request, tx.clone()))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(panic) => Err(anyhow::anyhow!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        )),
    };

    let output = match outcome {
        Ok(output) => output,
        Err(e) => {
            if let Err(rollback_err) = coordinator.rollback(&tx).await {
                tracing::error!(tx = tx.id(), error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }
    };

    // 提交失败时协调器已将事务置为 RolledBack
    coordinator.commit(&tx).await?;
    Ok(output)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteTableBuilder;
    use axum::body::Body;
    use http::Method;
    use serde_json::{json, Value};
    use trellis_core::{MapPropertySource, MemoryStore, Transaction};

    fn dispatcher(builder: RouteTableBuilder, store: &MemoryStore) -> Dispatcher {
        let routes = builder.build().unwrap();
        Dispatcher::new(
            Arc::new(routes),
            TransactionCoordinator::new(Arc::new(store.clone())),
        )
    }

    fn get(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_route_is_404() {
        let store = MemoryStore::new();
        let d = dispatcher(RouteTableBuilder::new(), &store);

        let response = d.dispatch(get("/api/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, "");
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_context_reaches_handler() {
        let store = MemoryStore::new();
        let d = dispatcher(
            RouteTableBuilder::new().route(
                Method::GET,
                "/api/whoami",
                Vec::new(),
                RouteHandler::encoded(|_req: RouteRequest, _tx: Transaction| async {
                    Ok(Value::String(RequestContext::source_id()?))
                }),
            ),
            &store,
        );

        let request = Request::builder()
            .uri("/api/whoami")
            .header("source_id", "deviceA")
            .body(Body::empty())
            .unwrap();
        let response = d.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "deviceA");

        // 缺失时为空
        let response = d.dispatch(get("/api/whoami")).await;
        assert_eq!(body_of(response).await, "");
        assert!(!RequestContext::is_active());
    }

    #[tokio::test]
    async fn test_handler_error_rolls_back() {
        let store = MemoryStore::new();
        let d = dispatcher(
            RouteTableBuilder::new().route(
                Method::POST,
                "/api/notes",
                Vec::new(),
                RouteHandler::encoded(|_req: RouteRequest, tx: Transaction| async move {
                    tx.put("notes/new", json!({"title": "draft"})).await?;
                    Err::<(), _>(anyhow::anyhow!("validation blew up"))
                }),
            ),
            &store,
        );

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/notes")
            .body(Body::empty())
            .unwrap();
        let response = d.dispatch(request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, "");
        assert_eq!(store.committed("notes/new"), None);
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn test_body_limits() {
        let store = MemoryStore::new();
        let d = dispatcher(
            RouteTableBuilder::new().route(
                Method::POST,
                "/api/echo",
                Vec::new(),
                RouteHandler::encoded(|req: RouteRequest, _tx: Transaction| async move {
                    req.json::<Value>()
                }),
            ),
            &store,
        )
        .with_max_body_size(8);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .header(CONTENT_LENGTH, "64")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = d.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/echo")
            .body(Body::from("[1,2]"))
            .unwrap();
        let response = d.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "[1,2]");
    }

    #[tokio::test]
    async fn test_from_environment() {
        let env = Environment::new().with_source(
            MapPropertySource::new("test")
                .with_property(SERVER_SOURCE_ID_HEADER, "x-device")
                .with_property(SERVER_MAX_BODY_SIZE, 16i64),
        );
        let store = MemoryStore::new();
        let routes = RouteTableBuilder::new()
            .route(
                Method::GET,
                "/api/whoami",
                Vec::new(),
                RouteHandler::encoded(|_req: RouteRequest, _tx: Transaction| async {
                    Ok(Value::String(RequestContext::source_id()?))
                }),
            )
            .build()
            .unwrap();
        let d = Dispatcher::from_environment(
            Arc::new(routes),
            TransactionCoordinator::new(Arc::new(store)),
            &env,
        );

        assert_eq!(d.max_body_size, 16);
        let request = Request::builder()
            .uri("/api/whoami")
            .header("x-device", "deviceB")
            .body(Body::empty())
            .unwrap();
        assert_eq!(body_of(d.dispatch(request).await).await, "deviceB");
    }
}
