//! 核心配置键

// ==================== Logging 配置 ====================

/// 日志级别
pub const LOGGING_LEVEL: &str = "logging.level";

/// 日志格式：compact / full / json / pretty
pub const LOGGING_FORMAT: &str = "logging.format";

/// 自定义过滤器，例如 "trellis_web=debug,hyper=warn"
pub const LOGGING_FILTER: &str = "logging.filter";

// ==================== 应用 ====================

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "trellis.toml";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "TRELLIS_";
