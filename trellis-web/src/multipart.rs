//! 文件请求体阶段
//!
//! 基于 multer 解析 `multipart/form-data`，把配置的单个文件字段附加到请求上。
//! 此阶段位于中间件管线内，在上下文与事务建立之前完成解析。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use trellis_core::Environment;

use crate::constants::*;
use crate::middleware::{Flow, Middleware, MiddlewareError, MiddlewareResult};
use crate::request::RouteRequest;

/// Multipart 配置属性
#[derive(Debug, Clone)]
pub struct MultipartProperties {
    /// 解析的文件字段名，默认 `upload`
    pub field_name: String,

    /// 最大流大小（字节），默认 10MB
    pub max_file_size: usize,
}

impl Default for MultipartProperties {
    fn default() -> Self {
        Self {
            field_name: DEFAULT_UPLOAD_FIELD.to_string(),
            max_file_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl MultipartProperties {
    /// 从 Environment 加载配置
    pub fn from_environment(env: &Environment) -> Self {
        let defaults = Self::default();
        Self {
            field_name: env
                .get_string(MULTIPART_FIELD_NAME)
                .unwrap_or(defaults.field_name),
            max_file_size: env
                .get_i64(MULTIPART_MAX_FILE_SIZE)
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.max_file_size),
        }
    }

    /// 转换为 multer::Constraints
    pub fn to_multer_constraints(&self) -> multer::Constraints {
        multer::Constraints::new()
            .size_limit(multer::SizeLimit::new().whole_stream(self.max_file_size as u64))
    }
}

/// 上传的文件
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    pub field_name: String,

    /// 原始文件名（如果提供）
    pub file_name: Option<String>,

    pub content_type: Option<String>,

    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 文件扩展名
    pub fn extension(&self) -> Option<&str> {
        self.file_name
            .as_ref()
            .and_then(|name| name.rfind('.').map(|pos| &name[pos + 1..]))
    }
}

/// 解析文件字段的中间件
///
/// 请求体中没有配置的字段时照常放行，由处理器决定如何响应；
/// 请求体格式错误时以 400 终止。
pub struct FileBodyMiddleware {
    properties: Arc<MultipartProperties>,
}

impl FileBodyMiddleware {
    pub fn new(properties: MultipartProperties) -> Self {
        Self {
            properties: Arc::new(properties),
        }
    }

    pub fn from_environment(env: &Environment) -> Self {
        Self::new(MultipartProperties::from_environment(env))
    }

    pub fn properties(&self) -> &MultipartProperties {
        &self.properties
    }

    async fn parse(&self, request: &RouteRequest) -> MiddlewareResult<Option<UploadedFile>> {
        // 非 multipart 请求不带文件，原样交给处理器
        let Some(content_type) = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| is_multipart(ct))
        else {
            return Ok(None);
        };

        let boundary = multer::parse_boundary(content_type)
            .map_err(|e| MiddlewareError::BodyParse(format!("Failed to parse boundary: {}", e)))?;

        let body = request.body().clone();
        let mut multipart = multer::Multipart::with_constraints(
            futures_util::stream::once(async move { Ok::<Bytes, std::io::Error>(body) }),
            boundary,
            self.properties.to_multer_constraints(),
        );

        while let Some(field) = multipart.next_field().await.map_err(|e| {
            MiddlewareError::BodyParse(format!("Failed to read multipart field: {}", e))
        })? {
            if field.name() != Some(self.properties.field_name.as_str()) {
                continue;
            }

            let field_name = self.properties.field_name.clone();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.to_string());
            let data = field.bytes().await.map_err(|e| {
                MiddlewareError::BodyParse(format!(
                    "Failed to read file field '{}': {}",
                    field_name, e
                ))
            })?;

            return Ok(Some(UploadedFile {
                field_name,
                file_name,
                content_type,
                data,
            }));
        }

        Ok(None)
    }
}

fn is_multipart(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media| media.trim().eq_ignore_ascii_case("multipart/form-data"))
        .unwrap_or(false)
}

impl Default for FileBodyMiddleware {
    fn default() -> Self {
        Self::new(MultipartProperties::default())
    }
}

#[async_trait]
impl Middleware for FileBodyMiddleware {
    fn name(&self) -> &str {
        "file-body"
    }

    async fn handle(&self, request: &mut RouteRequest) -> MiddlewareResult<Flow> {
        if let Some(file) = self.parse(request).await? {
            tracing::debug!(
                field = %file.field_name,
                file_name = ?file.file_name,
                size = file.size(),
                "Parsed uploaded file"
            );
            request.extensions_mut().insert(file);
        }
        Ok(Flow::Continue)
    }
}
