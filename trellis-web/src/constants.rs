//! Web 层配置键与默认值

// ==================== Server 配置 ====================

/// 服务器监听地址
pub const SERVER_HOST: &str = "server.host";

/// 服务器监听端口
pub const SERVER_PORT: &str = "server.port";

/// 是否启用 CORS
pub const SERVER_ENABLE_CORS: &str = "server.enable-cors";

/// 是否启用请求日志
pub const SERVER_ENABLE_REQUEST_LOGGING: &str = "server.enable-request-logging";

/// 请求体缓冲上限（字节）
pub const SERVER_MAX_BODY_SIZE: &str = "server.max-body-size";

/// 携带来源标识的请求头
pub const SERVER_SOURCE_ID_HEADER: &str = "server.source-id-header";

// ==================== Auth 配置 ====================

/// 为 false 时认证阶段放行所有请求
pub const AUTH_ENABLED: &str = "auth.enabled";

/// 携带 API token 的请求头
pub const AUTH_HEADER: &str = "auth.header";

/// 接受的 API token 列表
pub const AUTH_API_TOKENS: &str = "auth.api-tokens";

// ==================== Multipart 配置 ====================

/// 原始模式路由解析的文件字段名
pub const MULTIPART_FIELD_NAME: &str = "multipart.field-name";

/// Multipart 最大流大小（字节）
pub const MULTIPART_MAX_FILE_SIZE: &str = "multipart.max-file-size";

// ==================== 默认值 ====================

pub const DEFAULT_SOURCE_ID_HEADER: &str = "source_id";

pub const DEFAULT_AUTH_HEADER: &str = "authorization";

pub const DEFAULT_UPLOAD_FIELD: &str = "upload";

pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// 请求 ID 响应头
pub const REQUEST_ID_HEADER: &str = "x-request-id";
