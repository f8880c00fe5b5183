//! 处理器结果与结果编码器
//!
//! 处理器返回显式的 [`HandlerResult`]，编码器把它映射为状态码与响应体：
//!
//! | 结果 | 状态 | 响应体 |
//! |---|---|---|
//! | `NoContent` | 200 | 空 |
//! | `StatusAndBody(code, body)` | `code` | `body` 原样 |
//! | `Value(body)` | 200 | `body` |
//!
//! 响应体序列化规则：`null` 为空响应体，字符串按 `text/plain` 原样输出，
//! 其它值输出为 JSON。

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

/// 编码模式路由的处理器结果
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    /// 没有返回值
    NoContent,
    /// 显式状态码与响应体，通常表示预期内的业务拒绝
    StatusAndBody(StatusCode, Value),
    /// 普通值，状态码 200
    Value(Value),
}

impl HandlerResult {
    /// 序列化任意值作为普通结果
    pub fn json<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(HandlerResult::Value)
    }

    /// 显式状态码与可序列化的响应体
    pub fn status<T: Serialize>(status: StatusCode, body: &T) -> serde_json::Result<Self> {
        serde_json::to_value(body).map(|body| HandlerResult::StatusAndBody(status, body))
    }

    /// 编码后的状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            HandlerResult::StatusAndBody(status, _) => *status,
            HandlerResult::NoContent | HandlerResult::Value(_) => StatusCode::OK,
        }
    }

    pub fn body(&self) -> Option<&Value> {
        match self {
            HandlerResult::NoContent => None,
            HandlerResult::StatusAndBody(_, body) | HandlerResult::Value(body) => Some(body),
        }
    }
}

impl From<()> for HandlerResult {
    fn from(_: ()) -> Self {
        HandlerResult::NoContent
    }
}

impl From<Value> for HandlerResult {
    fn from(value: Value) -> Self {
        HandlerResult::Value(value)
    }
}

impl From<(StatusCode, Value)> for HandlerResult {
    fn from((status, body): (StatusCode, Value)) -> Self {
        HandlerResult::StatusAndBody(status, body)
    }
}

impl<T> From<Option<T>> for HandlerResult
where
    T: Into<HandlerResult>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HandlerResult::NoContent)
    }
}

/// 结果编码器，对三种结果都是全函数
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultEncoder;

impl ResultEncoder {
    pub fn encode(&self, result: HandlerResult) -> Response {
        match result {
            HandlerResult::NoContent => StatusCode::OK.into_response(),
            HandlerResult::StatusAndBody(status, body) => (status, encode_body(body)).into_response(),
            HandlerResult::Value(body) => (StatusCode::OK, encode_body(body)).into_response(),
        }
    }
}

fn encode_body(body: Value) -> Response {
    match body {
        Value::Null => ().into_response(),
        Value::String(text) => text.into_response(),
        other => Json(other).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_TYPE;
    use serde_json::json;

    async fn body_of(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_no_content() {
        let response = ResultEncoder.encode(().into());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "");
    }

    #[tokio::test]
    async fn test_plain_value_is_json() {
        let response = ResultEncoder.encode(json!({"id": "abc", "title": "Test"}).into());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(body, json!({"id": "abc", "title": "Test"}));
    }

    #[tokio::test]
    async fn test_explicit_status_verbatim() {
        let result = HandlerResult::from((
            StatusCode::NOT_FOUND,
            json!({"error": "branch not found"}),
        ));
        let response = ResultEncoder.encode(result);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_of(response).await, r#"{"error":"branch not found"}"#);

        let response = ResultEncoder.encode((StatusCode::BAD_REQUEST, json!("Invalid note type")).into());
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_of(response).await, "Invalid note type");
    }

    #[tokio::test]
    async fn test_sequence_value_is_plain_body() {
        // 以整数开头的数组也只是普通值
        let response = ResultEncoder.encode(json!([404, "not a status"]).into());

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, r#"[404,"not a status"]"#);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(HandlerResult::from(None::<Value>), HandlerResult::NoContent);
        assert_eq!(
            HandlerResult::from(Some(json!(1))),
            HandlerResult::Value(json!(1))
        );
        assert_eq!(
            HandlerResult::status(StatusCode::CONFLICT, &"exists").unwrap(),
            HandlerResult::StatusAndBody(StatusCode::CONFLICT, json!("exists"))
        );
        assert_eq!(HandlerResult::NoContent.status_code(), StatusCode::OK);
        assert!(HandlerResult::NoContent.body().is_none());
    }
}
