//! 错误边界
//!
//! 处理器、协作者或提交过程中未被处理的失败只在这里被观察一次：
//! 记录错误日志，返回固定的失败状态且不带响应体。内部细节只写入日志，
//! 从不发送给调用方。
//!
//! 处理器成功返回的非 200 显式结果也在这里以 info 级别记录，这属于可观测性，
//! 不是错误路径。

use std::any::Any;

use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};

use crate::result::HandlerResult;

#[derive(Debug, Clone, Copy)]
pub struct ErrorBoundary {
    failure_status: StatusCode,
}

impl Default for ErrorBoundary {
    fn default() -> Self {
        Self {
            failure_status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure_status(&self) -> StatusCode {
        self.failure_status
    }

    /// 记录意外失败并生成失败响应
    pub fn failure(&self, method: &Method, path: &str, error: &anyhow::Error) -> Response {
        tracing::error!("{} {} threw exception: {:?}", method, path, error);
        self.failure_response()
    }

    /// 固定状态、空响应体
    pub fn failure_response(&self) -> Response {
        self.failure_status.into_response()
    }

    /// 记录处理器返回的非 200 显式结果
    pub fn observe(&self, method: &Method, path: &str, result: &HandlerResult) {
        if let HandlerResult::StatusAndBody(status, body) = result {
            if *status != StatusCode::OK {
                tracing::info!(
                    "{} {} returned {} with response {}",
                    method,
                    path,
                    status.as_u16(),
                    body
                );
            }
        }
    }
}

/// 从 panic 负载中取出消息
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
