//! 日志初始化
//!
//! 代理层的每次调用决策都以 `trace` 级别记录在 `chimera_aop` 目标下，
//! 通常只需要单独调高这一个目标的级别，其余保持全局级别。

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{fmt as subscriber, EnvFilter};

use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};

/// 代理层日志使用的目标
pub const AOP_LOG_TARGET: &str = "chimera_aop";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("Invalid log level: {}", other)),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Json,
    /// 多行输出，适合开发时阅读调用链
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "full" => Ok(LogFormat::Full),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!("Invalid log format: {}", other)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// 代理层单独的级别，为空时跟随 `level`
    pub aop_level: Option<LogLevel>,
    pub format: LogFormat,
    pub show_target: bool,
    pub show_thread_names: bool,
    /// 完整的过滤指令，设置后覆盖上面的级别，例如 "chimera_aop=trace,warn"
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            aop_level: None,
            format: LogFormat::Compact,
            show_target: false,
            show_thread_names: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// 只调整代理层的级别
    pub fn aop_level(mut self, level: LogLevel) -> Self {
        self.aop_level = Some(level);
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 从环境变量读取（`RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`），无法解析的值忽略
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.filter = std::env::var("RUST_LOG").ok();
        if let Some(level) = std::env::var("LOG_LEVEL").ok().and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT").ok().and_then(|s| s.parse().ok()) {
            config.format = format;
        }
        config
    }

    /// 从 Environment 读取 `logging.*`，非法值返回配置错误
    pub fn from_environment(env: &Environment) -> ContainerResult<Self> {
        let parse = |key: &str| -> ContainerResult<Option<LogLevel>> {
            env.get_string(key)
                .map(|s| s.parse().map_err(ContainerError::Configuration))
                .transpose()
        };

        let mut config = Self::default();
        if let Some(level) = parse("logging.level")? {
            config.level = level;
        }
        config.aop_level = parse("logging.aop-level")?;
        if let Some(format) = env.get_string("logging.format") {
            config.format = format.parse().map_err(ContainerError::Configuration)?;
        }
        config.filter = env.get_string("logging.filter");
        config.show_target = env.get_bool_or("logging.show-target", false);
        config.show_thread_names = env.get_bool_or("logging.show-thread-names", false);
        Ok(config)
    }

    /// 由级别生成的过滤指令
    pub fn directives(&self) -> String {
        match self.aop_level {
            Some(aop) => format!("{},{}={}", self.level, AOP_LOG_TARGET, aop),
            None => self.level.to_string(),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.directives());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => fallback(),
        }
    }

    /// 安装全局日志订阅者；已经安装过时返回 [`ContainerError::LoggingInitFailed`]
    pub fn init(self) -> ContainerResult<()> {
        let builder = subscriber()
            .with_env_filter(self.env_filter())
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names);

        let result = match self.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Full => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
        };
        result.map_err(|e| ContainerError::LoggingInitFailed(e.to_string()))
    }
}
