//! 认证阶段
//!
//! 凭据校验本身由 [`Authenticator`] 的实现提供；[`AuthMiddleware`] 只负责
//! 放行或以 401 终止请求。

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use trellis_core::Environment;

use crate::constants::*;
use crate::middleware::{Flow, Middleware, MiddlewareError, MiddlewareResult};
use crate::request::RouteRequest;

/// 凭据校验
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// 请求是否携带有效凭据；校验过程本身失败时返回错误
    async fn authenticate(&self, request: &RouteRequest) -> MiddlewareResult<bool>;
}

/// 基于固定 API token 集合的校验
///
/// 请求头既可以直接携带 token，也可以使用 `Bearer <token>` 形式。
#[derive(Debug, Clone)]
pub struct TokenAuthenticator {
    header: String,
    tokens: HashSet<String>,
}

impl TokenAuthenticator {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            header: DEFAULT_AUTH_HEADER.to_string(),
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    pub fn from_environment(env: &Environment) -> Self {
        Self::new(env.get_string_array(AUTH_API_TOKENS).unwrap_or_default())
            .with_header(env.get_string_or(AUTH_HEADER, DEFAULT_AUTH_HEADER))
    }

    fn extract<'a>(&self, request: &'a RouteRequest) -> Option<&'a str> {
        let value = request.header(&self.header)?.trim();
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value)
            .trim();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl Authenticator for TokenAuthenticator {
    async fn authenticate(&self, request: &RouteRequest) -> MiddlewareResult<bool> {
        Ok(self
            .extract(request)
            .is_some_and(|token| self.tokens.contains(token)))
    }
}

/// 认证中间件
pub struct AuthMiddleware {
    authenticator: Arc<dyn Authenticator>,
    enabled: bool,
}

impl AuthMiddleware {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            authenticator,
            enabled: true,
        }
    }

    /// 放行所有请求
    pub fn disabled() -> Self {
        Self {
            authenticator: Arc::new(TokenAuthenticator::new(Vec::<String>::new())),
            enabled: false,
        }
    }

    pub fn from_environment(env: &Environment) -> Self {
        if !env.get_bool_or(AUTH_ENABLED, true) {
            tracing::warn!("Authentication is disabled, every request will be accepted");
            return Self::disabled();
        }
        Self::new(Arc::new(TokenAuthenticator::from_environment(env)))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    fn name(&self) -> &str {
        "auth"
    }

    async fn handle(&self, request: &mut RouteRequest) -> MiddlewareResult<Flow> {
        if !self.enabled || self.authenticator.authenticate(request).await? {
            return Ok(Flow::Continue);
        }
        Err(MiddlewareError::AuthenticationRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_matcher::Captures;
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method};
    use trellis_core::MapPropertySource;

    fn request(auth: Option<&str>) -> RouteRequest {
        let mut headers = HeaderMap::new();
        if let Some(value) = auth {
            headers.insert("authorization", HeaderValue::from_str(value).unwrap());
        }
        RouteRequest::new(
            Method::GET,
            "/api/notes/abc".parse().unwrap(),
            headers,
            Bytes::new(),
            Arc::from("/api/notes/:noteId"),
            Captures::default(),
        )
    }

    #[tokio::test]
    async fn test_token_accepted() {
        let auth = AuthMiddleware::new(Arc::new(TokenAuthenticator::new(["secret"])));

        assert!(matches!(
            auth.handle(&mut request(Some("secret"))).await,
            Ok(Flow::Continue)
        ));
        assert!(matches!(
            auth.handle(&mut request(Some("Bearer secret"))).await,
            Ok(Flow::Continue)
        ));
    }

    #[tokio::test]
    async fn test_missing_or_wrong_token_rejected() {
        let auth = AuthMiddleware::new(Arc::new(TokenAuthenticator::new(["secret"])));

        for value in [None, Some("wrong"), Some("Bearer ")] {
            let err = auth.handle(&mut request(value)).await.unwrap_err();
            assert!(matches!(err, MiddlewareError::AuthenticationRequired));
        }
    }

    #[tokio::test]
    async fn test_disabled_from_environment() {
        let env = Environment::new()
            .with_source(MapPropertySource::new("test").with_property(AUTH_ENABLED, false));
        let auth = AuthMiddleware::from_environment(&env);

        assert!(!auth.is_enabled());
        assert!(matches!(
            auth.handle(&mut request(None)).await,
            Ok(Flow::Continue)
        ));
    }

    #[tokio::test]
    async fn test_tokens_from_environment() {
        let env = Environment::new().with_source(
            MapPropertySource::new("test")
                .with_property(AUTH_API_TOKENS, "alpha, beta")
                .with_property(AUTH_HEADER, "trilium-token"),
        );
        let authenticator = TokenAuthenticator::from_environment(&env);

        let mut headers = HeaderMap::new();
        headers.insert("trilium-token", HeaderValue::from_static("beta"));
        let req = RouteRequest::new(
            Method::GET,
            "/api/tree".parse().unwrap(),
            headers,
            Bytes::new(),
            Arc::from("/api/tree"),
            Captures::default(),
        );
        assert!(authenticator.authenticate(&req).await.unwrap());
        assert!(!authenticator.authenticate(&request(Some("beta"))).await.unwrap());
    }
}
