// chimera-core: AOP 层依赖的容器契约
//
// 代理层只需要容器提供少量能力：
// - 可动态分派的对象模型（Bean / BeanClass / Method）
// - 构造完成后的 BeanPostProcessor 钩子
// - 正在创建中的 Bean 跟踪
// - 配置与日志

pub mod bean;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod utils;

// 重新导出常用类型
pub use bean::{
    downcast_value, no_such_method, same_bean, unit, value, Bean, BeanClass, BeanClassBuilder,
    ClassKey, Constructor, Instantiation, Interface, Method, Value,
};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use error::{ContainerError, ContainerResult, Result};
pub use lifecycle::{apply_after_initialization, BeanPostProcessor};
pub use logging::{LogFormat, LogLevel, LoggingConfig, AOP_LOG_TARGET};
pub use utils::dependency::{CreationGuard, CreationTracker};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::bean::{
        downcast_value, no_such_method, unit, value, Bean, BeanClass, Interface, Method, Value,
    };
    pub use crate::config::{Environment, MapPropertySource, PropertySource};
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::lifecycle::BeanPostProcessor;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use anyhow::{anyhow, Context};
}
