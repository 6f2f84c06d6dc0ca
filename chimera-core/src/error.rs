use thiserror::Error;

/// 容器协作方的统一错误类型
///
/// 代理层只依赖容器暴露出来的少量契约（Bean 查找、创建中检测、后置处理），
/// 这些契约上的失败都通过 `ContainerError` 报告。业务方法本身的错误走
/// `anyhow::Error`，不会被包装成容器错误。
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("Bean not found: {0}")]
    BeanNotFound(String),

    #[error("Bean already exists: {0}")]
    BeanAlreadyExists(String),

    /// 请求的 Bean 正在创建中（循环依赖场景）
    #[error("Bean '{0}' is currently in creation")]
    BeanCurrentlyInCreation(String),

    #[error("Bean creation failed: {0}")]
    BeanCreationFailed(String),

    #[error("No method '{method}' on type '{class}'")]
    NoSuchMethod { class: String, method: String },

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// BeanPostProcessor 处理失败
    #[error("Post-processing of bean '{bean}' failed: {source}")]
    PostProcessingFailed {
        bean: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Logging initialization failed: {0}")]
    LoggingInitFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 容器操作结果
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 业务代码使用的通用结果类型
pub use anyhow::Result;
