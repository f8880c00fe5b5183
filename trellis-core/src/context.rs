//! 请求作用域上下文
//!
//! 每个进入分发核心的请求都会在自己的任务树中建立一个 [`RequestContext`]。
//! 上下文通过 tokio 的 task-local 存储传播：被包裹的 future 以及它在任意
//! 挂起点之后恢复的所有延续都能读取到它，而同一调度器上交错执行的其它
//! 请求只能看到各自的上下文。
//!
//! 传播器本身不保存任何跨请求状态，作用域结束（被包裹的 future 完成或被
//! 丢弃）即意味着上下文结束。
//!
//! ```rust,ignore
//! use trellis_core::context::RequestContext;
//!
//! let ctx = RequestContext::new("deviceA");
//! ctx.scope(async {
//!     assert_eq!(RequestContext::source_id().unwrap(), "deviceA");
//! })
//! .await;
//! ```

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// 在任何请求作用域之外读取上下文，属于编程错误
    #[error("no request context is active on the current task")]
    MissingContext,
}

pub type ContextResult<T> = Result<T, ContextError>;

/// 单个请求的上下文
///
/// 克隆开销很小（内部为 `Arc<str>`），可以随意传递给协作者。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    source_id: Option<Arc<str>>,
}

impl RequestContext {
    /// 以调用方提供的来源标识创建上下文
    ///
    /// 空字符串视为未提供。
    pub fn new(source_id: impl AsRef<str>) -> Self {
        let source_id = source_id.as_ref();
        Self {
            source_id: (!source_id.is_empty()).then(|| Arc::from(source_id)),
        }
    }

    /// 不带来源标识的上下文
    pub fn anonymous() -> Self {
        Self { source_id: None }
    }

    /// 从可能缺失的请求头值创建上下文
    pub fn from_header(value: Option<&str>) -> Self {
        value.map(Self::new).unwrap_or_else(Self::anonymous)
    }

    /// 来源标识；未提供时为 `None`
    pub fn source(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// 在此上下文中运行 `fut`
    ///
    /// 这是传播器的 begin/end：上下文从 `fut` 首次被轮询开始可见，
    /// 到 `fut` 完成时结束。
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        REQUEST_CONTEXT.scope(self, fut).await
    }

    /// 在此上下文中同步执行闭包
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        REQUEST_CONTEXT.sync_scope(self, f)
    }

    /// 当前任务上的上下文
    pub fn current() -> ContextResult<RequestContext> {
        REQUEST_CONTEXT
            .try_with(Clone::clone)
            .map_err(|_| ContextError::MissingContext)
    }

    /// 当前请求的来源标识，未提供时返回空字符串
    pub fn source_id() -> ContextResult<String> {
        REQUEST_CONTEXT
            .try_with(|ctx| ctx.source().unwrap_or_default().to_string())
            .map_err(|_| ContextError::MissingContext)
    }

    /// 当前任务是否处于某个请求作用域内
    pub fn is_active() -> bool {
        REQUEST_CONTEXT.try_with(|_| ()).is_ok()
    }

    /// 判断某个变更是否由当前请求的调用方自己发起
    ///
    /// 同步逻辑用它来避免把调用方自己的写入回送给它。
    pub fn is_self_originated(change_source: Option<&str>) -> ContextResult<bool> {
        REQUEST_CONTEXT
            .try_with(|ctx| match (ctx.source(), change_source) {
                (Some(current), Some(change)) => current == change,
                _ => false,
            })
            .map_err(|_| ContextError::MissingContext)
    }
}

/// 在新任务中运行 `fut`，并携带当前请求上下文
///
/// `tokio::spawn` 不会继承 task-local，协作者需要派生子任务时应使用此函数。
/// 在请求作用域之外调用时，子任务没有上下文。
pub fn spawn<F>(fut: F) -> tokio::task::JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match RequestContext::current() {
        Ok(ctx) => tokio::spawn(ctx.scope(fut)),
        Err(_) => tokio::spawn(fut),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_source_is_absent() {
        assert_eq!(RequestContext::new("").source(), None);
        assert_eq!(RequestContext::from_header(None).source(), None);
        assert_eq!(RequestContext::from_header(Some("abc")).source(), Some("abc"));
    }

    #[test]
    fn test_current_outside_scope_is_missing() {
        assert_eq!(RequestContext::current(), Err(ContextError::MissingContext));
        assert!(!RequestContext::is_active());
    }

    #[test]
    fn test_sync_scope() {
        let seen = RequestContext::new("sync").sync_scope(|| RequestContext::source_id());
        assert_eq!(seen.unwrap(), "sync");
        assert!(!RequestContext::is_active());
    }

    #[tokio::test]
    async fn test_scope_survives_suspension() {
        RequestContext::new("deviceA")
            .scope(async {
                tokio::task::yield_now().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                assert_eq!(RequestContext::source_id().unwrap(), "deviceA");
            })
            .await;

        assert!(!RequestContext::is_active());
    }

    #[tokio::test]
    async fn test_interleaved_scopes_are_isolated() {
        async fn observe(expected: &'static str) {
            for i in 0..10u64 {
                tokio::time::sleep(Duration::from_millis(i % 3)).await;
                assert_eq!(RequestContext::source_id().unwrap(), expected);
                tokio::task::yield_now().await;
            }
        }

        tokio::join!(
            RequestContext::new("deviceA").scope(observe("deviceA")),
            RequestContext::new("deviceB").scope(observe("deviceB")),
        );
    }

    #[tokio::test]
    async fn test_spawn_carries_context() {
        let handle = RequestContext::new("parent")
            .scope(async { spawn(async { RequestContext::source_id() }) })
            .await;

        assert_eq!(handle.await.unwrap().unwrap(), "parent");

        let orphan = spawn(async { RequestContext::current() });
        assert_eq!(orphan.await.unwrap(), Err(ContextError::MissingContext));
    }

    #[tokio::test]
    async fn test_self_originated() {
        RequestContext::new("me")
            .scope(async {
                assert!(RequestContext::is_self_originated(Some("me")).unwrap());
                assert!(!RequestContext::is_self_originated(Some("other")).unwrap());
                assert!(!RequestContext::is_self_originated(None).unwrap());
            })
            .await;

        assert!(RequestContext::is_self_originated(Some("me")).is_err());
    }
}
