//! 中间件管线
//!
//! 每条路由持有一个有序的中间件列表。每个阶段返回 [`Flow::Continue`]
//! 或一个终止响应，分发器在第一个终止结果处停止。
//! 中间件在请求上下文与事务建立之前运行。

use std::sync::Arc;

use async_trait::async_trait;
use axum::response::{IntoResponse, Response};
use http::StatusCode;

use crate::request::RouteRequest;

/// 中间件阶段的结果
#[derive(Debug)]
pub enum Flow {
    Continue,
    Respond(Response),
}

pub type MiddlewareResult<T> = Result<T, MiddlewareError>;

#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid request body: {0}")]
    BodyParse(String),

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Middleware execution failed: {0}")]
    ExecutionFailed(String),
}

impl MiddlewareError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::BodyParse(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 是否属于意外失败，需要经由错误边界记录
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::ExecutionFailed(_))
    }
}

impl IntoResponse for MiddlewareError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::AuthenticationRequired => (status, "Not authorized").into_response(),
            Self::BodyParse(message) => (status, message).into_response(),
            _ => status.into_response(),
        }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// 处理请求；可以修改请求（例如附加解析结果）或直接给出响应
    async fn handle(&self, request: &mut RouteRequest) -> MiddlewareResult<Flow>;
}

/// 中间件管线执行结果
#[derive(Debug)]
pub enum PipelineOutcome {
    Proceed,
    ShortCircuit(Response),
    Failed(MiddlewareError),
}

/// 按顺序运行中间件，遇到第一个终止结果即停止
pub async fn run_pipeline(
    stages: &[Arc<dyn Middleware>],
    request: &mut RouteRequest,
) -> PipelineOutcome {
    for stage in stages {
        match stage.handle(request).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Respond(response)) => {
                tracing::debug!(
                    middleware = stage.name(),
                    path = request.path(),
                    status = response.status().as_u16(),
                    "Request terminated by middleware"
                );
                return PipelineOutcome::ShortCircuit(response);
            }
            Err(e) => {
                tracing::debug!(
                    middleware = stage.name(),
                    path = request.path(),
                    error = %e,
                    "Middleware rejected request"
                );
                return PipelineOutcome::Failed(e);
            }
        }
    }

    PipelineOutcome::Proceed
}
