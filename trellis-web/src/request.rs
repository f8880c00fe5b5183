//! 处理器看到的请求
//!
//! 请求体在中间件链运行之前已完整缓冲，捕获值来自路由匹配。
//! 中间件可以通过 extensions 向处理器传递数据，例如上传的文件。

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};
use serde::de::DeserializeOwned;

use crate::multipart::UploadedFile;
use crate::path_matcher::Captures;

#[derive(Debug)]
pub struct RouteRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    route: Arc<str>,
    captures: Captures,
    extensions: Extensions,
}

impl RouteRequest {
    pub fn new(
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        route: Arc<str>,
        captures: Captures,
    ) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            route,
            captures,
            extensions: Extensions::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// 匹配到的路由规格
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// 读取请求头；值不是合法 ASCII 时视为缺失
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// 将请求体按 JSON 反序列化
    pub fn json<T>(&self) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
    {
        if self.body.is_empty() {
            return Err(anyhow!("request body is empty"));
        }
        serde_json::from_slice(&self.body).context("request body is not valid JSON")
    }

    pub fn captures(&self) -> &Captures {
        &self.captures
    }

    /// 读取命名捕获；缺失时返回错误
    pub fn param(&self, name: &str) -> anyhow::Result<&str> {
        self.captures
            .get(name)
            .ok_or_else(|| anyhow!("route '{}' has no parameter '{}'", self.route, name))
    }

    /// 读取位置捕获；缺失时返回错误
    pub fn capture(&self, index: usize) -> anyhow::Result<&str> {
        self.captures
            .at(index)
            .ok_or_else(|| anyhow!("route '{}' has no capture #{}", self.route, index))
    }

    /// 读取查询参数，同名时取最后一个
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.uri
            .query()?
            .split('&')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_component(key) == name).then(|| decode_component(value).into_owned())
            })
            .last()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// 文件阶段解析出的上传文件
    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        self.extensions.get::<UploadedFile>()
    }

    pub fn take_uploaded_file(&mut self) -> Option<UploadedFile> {
        self.extensions.remove::<UploadedFile>()
    }
}

fn decode_component(raw: &str) -> Cow<'_, str> {
    if raw.contains('+') {
        let spaced = raw.replace('+', " ");
        return Cow::Owned(
            urlencoding::decode(&spaced)
                .map(Cow::into_owned)
                .unwrap_or(spaced),
        );
    }
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}
