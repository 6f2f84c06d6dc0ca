//! AOP 错误类型

use chimera_core::ContainerError;
use std::time::Duration;
use thiserror::Error;

/// AOP 框架错误
///
/// 配置错误与使用错误总是立即返回给调用方；目标方法或通知抛出的错误
/// 不会被转换成 `AopError`，而是原样穿过调用链。
#[derive(Debug, Error)]
pub enum AopError {
    /// 非法配置：冻结后修改、无法生成代理等
    #[error("AOP configuration error: {0}")]
    Configuration(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 当前线程没有暴露代理
    #[error(
        "Cannot find current proxy: set 'expose_proxy' to true on the proxy configuration \
         to make it available, and ensure the call is made on the proxy's own thread"
    )]
    ProxyNotExposed,

    /// 当前线程没有正在执行的被通知调用
    #[error(
        "No join point found: register the expose-invocation advisor at the start of the \
         advisor chain"
    )]
    InvocationNotExposed,

    /// 切点匹配逻辑自身失败
    #[error("Pointcut '{pointcut}' failed to evaluate {method}: {source}")]
    MatchEvaluation {
        pointcut: String,
        method: String,
        #[source]
        source: anyhow::Error,
    },

    /// 子类代理生成阶段构造目标失败
    #[error("Could not generate subclass proxy for '{class}': {source}")]
    ProxyGeneration {
        class: String,
        #[source]
        source: anyhow::Error,
    },

    /// 接口代理上调用了未暴露的方法
    #[error("Method '{method}' is not exposed by proxy interfaces [{interfaces}]")]
    MethodNotExposed { method: String, interfaces: String },

    /// 没有可调用的目标对象
    #[error("No target available to invoke {0}: the proxy only carries introduced capabilities")]
    NoTarget(String),

    #[error("Failed to create target: {0}")]
    TargetCreation(#[source] anyhow::Error),

    #[error("Failed to release target: {0}")]
    TargetRelease(#[source] anyhow::Error),

    #[error("Target pool exhausted: {max_size} instance(s) in use, waited {waited:?}")]
    PoolExhausted { max_size: usize, waited: Duration },

    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// AOP 操作结果
pub type AopResult<T> = std::result::Result<T, AopError>;

impl AopError {
    /// 冻结配置上的结构修改
    pub(crate) fn frozen(action: &str) -> Self {
        AopError::Configuration(format!("Cannot {}: configuration is frozen", action))
    }
}
