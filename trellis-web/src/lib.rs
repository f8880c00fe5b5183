// trellis-web: 基于 Axum 的请求分发核心
//
// 路由表、路径匹配、中间件管线、事务分发器、结果编码器与错误边界，
// 以及承载它们的服务器外壳。

pub mod auth;
pub mod boundary;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod multipart;
pub mod path_matcher;
pub mod request;
pub mod result;
pub mod route;
pub mod server;

pub use auth::{AuthMiddleware, Authenticator, TokenAuthenticator};
pub use boundary::ErrorBoundary;
pub use dispatcher::Dispatcher;
pub use error::{RouteError, WebError, WebResult};
pub use middleware::{Flow, Middleware, MiddlewareError, MiddlewareResult};
pub use multipart::{FileBodyMiddleware, MultipartProperties, UploadedFile};
pub use path_matcher::{Captures, PathMatcher, PathSpec, PathSpecError};
pub use request::RouteRequest;
pub use result::{HandlerResult, ResultEncoder};
pub use route::{
    HandlerOutput, ResponseMode, RouteHandler, RouteRegistration, RouteTable, RouteTableBuilder,
};
pub use server::{ServerProperties, WebServer};

// 重新导出常用依赖，方便用户使用
pub use axum;
pub use http::{Method, StatusCode};

/// Prelude 模块
pub mod prelude {
    pub use crate::{
        Dispatcher, HandlerResult, PathSpec, RouteHandler, RouteRequest, RouteTable,
        RouteTableBuilder, UploadedFile, WebServer,
    };
    pub use http::{Method, StatusCode};
    pub use trellis_core::prelude::*;
}
