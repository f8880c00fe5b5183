//! 路径匹配
//!
//! 两种路径规格共用一个匹配接口：
//!
//! - 字面量规格，例如 `/api/tree/:branchId/expanded/:expanded`。
//!   字面段按 ASCII 忽略大小写比较，允许一个结尾斜杠，`:name` 段产生命名捕获。
//! - 正则规格，例如 `/api/notes/(.*)/type/(.*)/mime/(.*)`。
//!   表达式锚定整个路径，捕获组按顺序成为位置捕获，命名组同时可按名字读取。
//!
//! 规格在注册时编译一次，匹配是纯函数。所有捕获值都会做百分号解码。

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathSpecError {
    #[error("invalid path pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("path spec '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("path spec '{0}' has an unnamed parameter")]
    EmptyParameter(String),
}

/// 未编译的路径规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSpec {
    /// 字面段与 `:name` 参数
    Literal(String),
    /// 带捕获组的正则表达式
    Pattern(String),
}

impl PathSpec {
    pub fn literal(spec: impl Into<String>) -> Self {
        PathSpec::Literal(spec.into())
    }

    pub fn pattern(pattern: impl Into<String>) -> Self {
        PathSpec::Pattern(pattern.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            PathSpec::Literal(s) | PathSpec::Pattern(s) => s,
        }
    }
}

impl From<&str> for PathSpec {
    fn from(spec: &str) -> Self {
        PathSpec::Literal(spec.to_string())
    }
}

impl From<String> for PathSpec {
    fn from(spec: String) -> Self {
        PathSpec::Literal(spec)
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次匹配得到的捕获
///
/// 字面量规格的参数既按名字也按出现顺序保存；正则规格的每个捕获组按顺序保存，
/// 未参与匹配的组为空字符串。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    positional: Vec<String>,
    named: Vec<(Arc<str>, String)>,
}

impl Captures {
    /// 按名字读取；同名时后者生效
    pub fn get(&self, name: &str) -> Option<&str> {
        self.named
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// 按位置读取，从 0 开始
    pub fn at(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }

    pub fn named(&self) -> impl Iterator<Item = (&str, &str)> {
        self.named.iter().map(|(k, v)| (k.as_ref(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(Arc<str>),
}

#[derive(Debug, Clone)]
enum Compiled {
    Segments(Vec<Segment>),
    Pattern {
        regex: Regex,
        names: Vec<Option<Arc<str>>>,
    },
}

/// 编译后的路径匹配器
#[derive(Debug, Clone)]
pub struct PathMatcher {
    spec: PathSpec,
    compiled: Compiled,
}

impl PathMatcher {
    pub fn compile(spec: impl Into<PathSpec>) -> Result<Self, PathSpecError> {
        let spec = spec.into();
        let compiled = match &spec {
            PathSpec::Literal(literal) => Compiled::Segments(Self::compile_literal(literal)?),
            PathSpec::Pattern(pattern) => {
                let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
                    PathSpecError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    }
                })?;
                let names = regex
                    .capture_names()
                    .skip(1)
                    .map(|name| name.map(Arc::from))
                    .collect();
                Compiled::Pattern { regex, names }
            }
        };

        Ok(Self { spec, compiled })
    }

    fn compile_literal(literal: &str) -> Result<Vec<Segment>, PathSpecError> {
        if !literal.starts_with('/') {
            return Err(PathSpecError::NotAbsolute(literal.to_string()));
        }

        split_segments(literal)
            .map(|segment| match segment.strip_prefix(':') {
                Some("") => Err(PathSpecError::EmptyParameter(literal.to_string())),
                Some(name) => Ok(Segment::Param(Arc::from(name))),
                None => Ok(Segment::Literal(segment.to_string())),
            })
            .collect()
    }

    pub fn spec(&self) -> &PathSpec {
        &self.spec
    }

    /// 匹配请求路径（不含查询串）
    pub fn matches(&self, path: &str) -> Option<Captures> {
        match &self.compiled {
            Compiled::Segments(segments) => Self::match_segments(segments, path),
            Compiled::Pattern { regex, names } => {
                let caps = regex.captures(path)?;
                let mut captures = Captures::default();
                for (index, name) in names.iter().enumerate() {
                    let value = caps
                        .get(index + 1)
                        .map(|m| decode(m.as_str()))
                        .unwrap_or_default();
                    if let Some(name) = name {
                        captures.named.push((Arc::clone(name), value.clone()));
                    }
                    captures.positional.push(value);
                }
                Some(captures)
            }
        }
    }

    fn match_segments(segments: &[Segment], path: &str) -> Option<Captures> {
        if !path.starts_with('/') {
            return None;
        }

        let mut parts = split_segments(path);
        let mut captures = Captures::default();

        for segment in segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(expected) => {
                    if !expected.eq_ignore_ascii_case(part) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    let value = decode(part);
                    captures.named.push((Arc::clone(name), value.clone()));
                    captures.positional.push(value);
                }
            }
        }

        parts.next().is_none().then_some(captures)
    }
}

/// 去掉开头斜杠和一个结尾斜杠后按 `/` 切分；根路径没有段
fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let mut iter = trimmed.split('/');
    if trimmed.is_empty() {
        // 跳过 "".split('/') 产生的唯一空段
        iter.next();
    }
    iter
}

fn decode(raw: &str) -> String {
    urlencoding::decode(raw)
        .unwrap_or(Cow::Borrowed(raw))
        .into_owned()
}
