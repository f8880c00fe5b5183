// trellis-core: 分发核心的基础设施
//
// 提供与 HTTP 无关的横切能力：
// - 分层配置与日志初始化
// - 请求作用域上下文的传播
// - 数据存储抽象与事务协调器

pub mod app;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod logging;
pub mod store;
pub mod transaction;

pub use app::TrellisApplication;
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use context::{ContextError, ContextResult, RequestContext};
pub use error::{CoreError, CoreResult, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use store::{MemoryStore, Store, StoreError, StoreResult, StoreTransaction};
pub use transaction::{
    Transaction, TransactionCoordinator, TransactionError, TransactionResult, TransactionState,
};

pub use async_trait;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::config::Environment;
    pub use crate::context::RequestContext;
    pub use crate::error::Result;
    pub use crate::store::{MemoryStore, Store};
    pub use crate::transaction::{Transaction, TransactionCoordinator, TransactionState};
    pub use anyhow::{anyhow, bail, Context};
}
