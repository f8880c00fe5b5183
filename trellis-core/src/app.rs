use std::path::Path;
use std::sync::Arc;

use crate::config::{EnvironmentPropertySource, MapPropertySource, TomlPropertySource};
use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_PREFIX};
use crate::error::CoreResult;
use crate::logging::LoggingConfig;
use crate::Environment;

/// 应用启动器
///
/// 负责加载配置并初始化日志，返回共享的 [`Environment`]。
/// 路由表与服务器由调用方在此之后显式构建。
pub struct TrellisApplication {
    name: String,
    config_files: Vec<String>,
    env_prefix: String,
    overrides: Option<MapPropertySource>,
    logging_config: Option<LoggingConfig>,
    init_logging: bool,
}

impl TrellisApplication {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_files: vec![DEFAULT_CONFIG_FILE.to_string()],
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            overrides: None,
            logging_config: None,
            init_logging: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 设置配置文件路径
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_files = vec![path.into()];
        self
    }

    /// 添加多个配置文件，后者优先
    pub fn config_files(mut self, paths: Vec<String>) -> Self {
        self.config_files = paths;
        self
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 代码内覆盖配置，优先级介于文件与环境变量之间
    pub fn properties(mut self, overrides: MapPropertySource) -> Self {
        self.overrides = Some(overrides);
        self
    }

    /// 设置日志配置；不设置时从配置与环境变量读取
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 跳过日志初始化（测试或宿主已安装订阅者时）
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// 加载配置、初始化日志
    ///
    /// 缺失的配置文件会被跳过，格式错误的配置文件是启动错误。
    pub fn bootstrap(self) -> CoreResult<Arc<Environment>> {
        let environment = Environment::new();

        for (index, file) in self.config_files.iter().enumerate() {
            if Path::new(file).exists() {
                let source = TomlPropertySource::from_file(file)?.with_priority(index as i32);
                environment.add_property_source(Box::new(source));
            }
        }

        if let Some(overrides) = self.overrides {
            environment.add_property_source(Box::new(overrides));
        }
        environment.add_property_source(Box::new(EnvironmentPropertySource::new(
            self.env_prefix.clone(),
        )));

        if self.init_logging {
            let logging = match self.logging_config {
                Some(config) => config,
                None => LoggingConfig::from_environment(&environment)?,
            };
            logging.init()?;
        }

        let loaded: Vec<&str> = self
            .config_files
            .iter()
            .filter(|f| Path::new(f.as_str()).exists())
            .map(String::as_str)
            .collect();
        tracing::info!(app = %self.name, config_files = ?loaded, "Configuration loaded");

        Ok(Arc::new(environment))
    }
}
