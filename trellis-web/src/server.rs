//! Web 服务器模块
//!
//! 基于 Axum 的服务器外壳：分发器作为兜底服务，额外的页面路由可以
//! 通过 [`WebServer::with_router`] 挂在它前面。

use std::time::Instant;

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use trellis_core::Environment;

use crate::constants::*;
use crate::dispatcher::Dispatcher;
use crate::error::{WebError, WebResult};

/// Web 服务器配置
#[derive(Debug, Clone)]
pub struct ServerProperties {
    /// 服务器监听地址
    pub host: String,

    /// 服务器监听端口
    pub port: u16,

    /// 是否启用 CORS
    pub enable_cors: bool,

    /// 是否启用请求日志
    pub enable_request_logging: bool,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: false,
            enable_request_logging: true,
        }
    }
}

impl ServerProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            host: env.get_string(SERVER_HOST).unwrap_or(defaults.host),
            port: env
                .get_i64(SERVER_PORT)
                .and_then(|v| u16::try_from(v).ok())
                .unwrap_or(defaults.port),
            enable_cors: env.get_bool_or(SERVER_ENABLE_CORS, defaults.enable_cors),
            enable_request_logging: env
                .get_bool_or(SERVER_ENABLE_REQUEST_LOGGING, defaults.enable_request_logging),
        }
    }

    /// 获取服务器地址
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub struct WebServer {
    properties: ServerProperties,
    dispatcher: Dispatcher,
    router: Option<Router>,
}

impl WebServer {
    pub fn new(properties: ServerProperties, dispatcher: Dispatcher) -> Self {
        Self {
            properties,
            dispatcher,
            router: None,
        }
    }

    pub fn from_environment(env: &Environment, dispatcher: Dispatcher) -> Self {
        Self::new(ServerProperties::from_environment(env), dispatcher)
    }

    /// 设置在分发器之前匹配的额外路由（页面等）
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn properties(&self) -> &ServerProperties {
        &self.properties
    }

    /// 组装完整的 axum 路由
    pub fn into_router(self) -> Router {
        let dispatcher = self.dispatcher;
        let mut router = self
            .router
            .unwrap_or_else(Router::new)
            .fallback(move |request: Request| {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.dispatch(request).await }
            });

        if self.properties.enable_request_logging {
            router = router.layer(middleware::from_fn(request_logging));
        }
        router = router
            .layer(middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http());
        if self.properties.enable_cors {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// 启动服务器，收到 Ctrl-C 后优雅关闭
    pub async fn run(self) -> WebResult<()> {
        let address = self.properties.address();
        let app = self.into_router();

        tracing::info!("Starting Trellis server on {}", address);

        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| WebError::Bind {
                address: address.clone(),
                source,
            })?;

        tracing::info!("Server listening on http://{}", address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(WebError::Serve)?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// 请求日志中间件
pub async fn request_logging(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "Request completed"
    );

    response
}

/// 请求 ID 中间件
///
/// 沿用调用方提供的 `x-request-id`，否则生成新的 UUID。
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = match req.headers().get(REQUEST_ID_HEADER) {
        Some(value) => value.clone(),
        None => match HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()) {
            Ok(value) => value,
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        },
    };

    req.headers_mut().insert(REQUEST_ID_HEADER, id.clone());
    let mut response = next.run(req).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, id);

    response
}
