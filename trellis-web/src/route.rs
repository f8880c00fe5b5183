//! 路由表
//!
//! 路由在启动时通过 [`RouteTableBuilder`] 显式注册，构建后的 [`RouteTable`]
//! 不可变，可在多个请求间无锁共享。匹配按注册顺序进行，第一个匹配者生效。
//!
//! ```rust,ignore
//! let routes = RouteTableBuilder::new()
//!     .with_auth(Arc::new(auth))
//!     .api(Method::GET, "/api/notes/:noteId", notes::get_note)
//!     .api(Method::PUT, PathSpec::pattern(r"/api/notes/(.*)/type/(.*)/mime/(.*)"), notes::set_type)
//!     .build()?;
//! ```

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::response::Response;
use http::Method;
use trellis_core::{Environment, Transaction};

use crate::auth::AuthMiddleware;
use crate::error::RouteError;
use crate::middleware::Middleware;
use crate::multipart::FileBodyMiddleware;
use crate::path_matcher::{Captures, PathMatcher, PathSpec};
use crate::request::RouteRequest;
use crate::result::HandlerResult;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type EncodedFn =
    dyn Fn(RouteRequest, Transaction) -> BoxFuture<anyhow::Result<HandlerResult>> + Send + Sync;
type RawFn = dyn Fn(RouteRequest, Transaction) -> BoxFuture<anyhow::Result<Response>> + Send + Sync;

/// 响应模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// 返回值经由结果编码器
    Encoded,
    /// 处理器自行构造响应
    Raw,
}

/// 处理器引用
#[derive(Clone)]
pub enum RouteHandler {
    Encoded(Arc<EncodedFn>),
    Raw(Arc<RawFn>),
}

/// 处理器产出
#[derive(Debug)]
pub enum HandlerOutput {
    Encoded(HandlerResult),
    Raw(Response),
}

impl RouteHandler {
    /// 包装一个编码模式处理器
    pub fn encoded<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(RouteRequest, Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        let wrapped: Arc<EncodedFn> = Arc::new(
            move |request: RouteRequest, tx: Transaction| -> BoxFuture<anyhow::Result<HandlerResult>> {
                let fut = handler(request, tx);
                Box::pin(async move { fut.await.map(Into::<HandlerResult>::into) })
            },
        );
        RouteHandler::Encoded(wrapped)
    }

    /// 包装一个原始模式处理器
    pub fn raw<F, Fut>(handler: F) -> Self
    where
        F: Fn(RouteRequest, Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        let wrapped: Arc<RawFn> = Arc::new(
            move |request: RouteRequest, tx: Transaction| -> BoxFuture<anyhow::Result<Response>> {
                Box::pin(handler(request, tx))
            },
        );
        RouteHandler::Raw(wrapped)
    }

    pub fn mode(&self) -> ResponseMode {
        match self {
            RouteHandler::Encoded(_) => ResponseMode::Encoded,
            RouteHandler::Raw(_) => ResponseMode::Raw,
        }
    }

    pub fn call(&self, request: RouteRequest, tx: Transaction) -> BoxFuture<anyhow::Result<HandlerOutput>> {
        match self {
            RouteHandler::Encoded(handler) => {
                let fut = handler(request, tx);
                Box::pin(async move { fut.await.map(HandlerOutput::Encoded) })
            }
            RouteHandler::Raw(handler) => {
                let fut = handler(request, tx);
                Box::pin(async move { fut.await.map(HandlerOutput::Raw) })
            }
        }
    }
}

impl fmt::Debug for RouteHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RouteHandler").field(&self.mode()).finish()
    }
}

/// 一条路由注册
pub struct RouteRegistration {
    method: Method,
    matcher: PathMatcher,
    spec: Arc<str>,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: RouteHandler,
}

impl RouteRegistration {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn spec(&self) -> &PathSpec {
        self.matcher.spec()
    }

    pub(crate) fn spec_str(&self) -> &Arc<str> {
        &self.spec
    }

    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn handler(&self) -> &RouteHandler {
        &self.handler
    }

    pub fn mode(&self) -> ResponseMode {
        self.handler.mode()
    }
}

impl fmt::Debug for RouteRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("RouteRegistration")
            .field("method", &self.method)
            .field("spec", &self.spec)
            .field("middleware", &stages)
            .field("mode", &self.mode())
            .finish()
    }
}

/// 不可变路由表
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<RouteRegistration>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// 按注册顺序查找第一个匹配的路由
    pub fn find(&self, method: &Method, path: &str) -> Option<(&RouteRegistration, Captures)> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| route.matcher.matches(path).map(|captures| (route, captures)))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RouteRegistration> {
        self.routes.iter()
    }
}

#[derive(Clone, Copy)]
enum Stage {
    Auth,
    FileBody,
}

enum Stages {
    Standard(Vec<Stage>),
    Custom(Vec<Arc<dyn Middleware>>),
}

struct PendingRoute {
    method: Method,
    spec: PathSpec,
    stages: Stages,
    handler: RouteHandler,
}

/// 路由表构建器
///
/// 路径规格在 [`build`](Self::build) 时统一编译，任何错误都会使构建失败。
#[derive(Default)]
pub struct RouteTableBuilder {
    auth: Option<Arc<dyn Middleware>>,
    file_body: Option<Arc<dyn Middleware>>,
    pending: Vec<PendingRoute>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用配置中的认证与文件阶段
    pub fn from_environment(env: &Environment) -> Self {
        Self::new()
            .with_auth(Arc::new(AuthMiddleware::from_environment(env)))
            .with_file_body(Arc::new(FileBodyMiddleware::from_environment(env)))
    }

    pub fn with_auth(mut self, auth: Arc<dyn Middleware>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_file_body(mut self, file_body: Arc<dyn Middleware>) -> Self {
        self.file_body = Some(file_body);
        self
    }

    /// 注册需要认证的编码模式路由
    pub fn api<F, Fut, R>(self, method: Method, spec: impl Into<PathSpec>, handler: F) -> Self
    where
        F: Fn(RouteRequest, Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<HandlerResult>,
    {
        self.push(
            method,
            spec.into(),
            Stages::Standard(vec![Stage::Auth]),
            RouteHandler::encoded(handler),
        )
    }

    /// 注册需要认证与文件解析的原始模式路由
    pub fn http_api<F, Fut>(self, method: Method, spec: impl Into<PathSpec>, handler: F) -> Self
    where
        F: Fn(RouteRequest, Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
    {
        self.push(
            method,
            spec.into(),
            Stages::Standard(vec![Stage::Auth, Stage::FileBody]),
            RouteHandler::raw(handler),
        )
    }

    /// 使用任意中间件列表注册路由
    pub fn route(
        self,
        method: Method,
        spec: impl Into<PathSpec>,
        middleware: Vec<Arc<dyn Middleware>>,
        handler: RouteHandler,
    ) -> Self {
        self.push(method, spec.into(), Stages::Custom(middleware), handler)
    }

    fn push(mut self, method: Method, spec: PathSpec, stages: Stages, handler: RouteHandler) -> Self {
        self.pending.push(PendingRoute {
            method,
            spec,
            stages,
            handler,
        });
        self
    }

    fn resolve(&self, route: &PendingRoute) -> Result<Vec<Arc<dyn Middleware>>, RouteError> {
        let stages = match &route.stages {
            Stages::Custom(middleware) => return Ok(middleware.clone()),
            Stages::Standard(stages) => stages,
        };

        stages
            .iter()
            .map(|stage| {
                let (configured, name) = match stage {
                    Stage::Auth => (&self.auth, "auth"),
                    Stage::FileBody => (&self.file_body, "file-body"),
                };
                configured.clone().ok_or_else(|| RouteError::MissingStage {
                    method: route.method.clone(),
                    spec: route.spec.to_string(),
                    stage: name,
                })
            })
            .collect()
    }

    pub fn build(self) -> Result<RouteTable, RouteError> {
        let mut routes = Vec::with_capacity(self.pending.len());

        for route in &self.pending {
            let middleware = self.resolve(route)?;
            let matcher =
                PathMatcher::compile(route.spec.clone()).map_err(|source| RouteError::InvalidPath {
                    method: route.method.clone(),
                    spec: route.spec.to_string(),
                    source,
                })?;

            tracing::debug!(
                method = %route.method,
                spec = %route.spec,
                mode = ?route.handler.mode(),
                "Route registered"
            );

            routes.push(RouteRegistration {
                method: route.method.clone(),
                spec: Arc::from(route.spec.as_str()),
                matcher,
                middleware,
                handler: route.handler.clone(),
            });
        }

        tracing::info!(routes = routes.len(), "Route table built");
        Ok(RouteTable { routes })
    }
}
