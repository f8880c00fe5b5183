//! Web 层错误类型

use http::Method;
use thiserror::Error;

use crate::path_matcher::PathSpecError;

/// 构建路由表时的错误
#[derive(Debug, Error)]
pub enum RouteError {
    /// 路径规格无法编译
    #[error("invalid path for {method} {spec}: {source}")]
    InvalidPath {
        method: Method,
        spec: String,
        #[source]
        source: PathSpecError,
    },

    /// 路由需要的中间件阶段没有配置
    #[error("{method} {spec} requires the '{stage}' stage, which was not configured")]
    MissingStage {
        method: Method,
        spec: String,
        stage: &'static str,
    },
}

/// 服务器运行错误
#[derive(Debug, Error)]
pub enum WebError {
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

pub type WebResult<T> = Result<T, WebError>;
