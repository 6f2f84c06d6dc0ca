//! BeanPostProcessor - Bean 构造完成后的扩展钩子
//!
//! 容器在每个受管对象构造完成后依次调用已注册的处理器，
//! 处理器可以原样返回对象，也可以返回一个包装（例如 AOP 代理）

use std::sync::Arc;

use crate::bean::Bean;
use crate::error::ContainerResult;

/// BeanPostProcessor trait
///
/// # 示例
///
/// ```ignore
/// impl BeanPostProcessor for TracingPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: Arc<dyn Bean>,
///         bean_name: &str,
///     ) -> ContainerResult<Arc<dyn Bean>> {
///         tracing::info!("After initialization: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在初始化回调之前调用
    fn post_process_before_initialization(
        &self,
        bean: Arc<dyn Bean>,
        _bean_name: &str,
    ) -> ContainerResult<Arc<dyn Bean>> {
        Ok(bean)
    }

    /// 在初始化回调之后调用
    ///
    /// 返回值会替换容器中保存的对象，典型用途是创建 AOP 代理
    fn post_process_after_initialization(
        &self,
        bean: Arc<dyn Bean>,
        _bean_name: &str,
    ) -> ContainerResult<Arc<dyn Bean>> {
        Ok(bean)
    }

    /// 处理器名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 处理器优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }
}

/// 按优先级依次应用 `post_process_after_initialization`
pub fn apply_after_initialization(
    processors: &[Arc<dyn BeanPostProcessor>],
    bean: Arc<dyn Bean>,
    bean_name: &str,
) -> ContainerResult<Arc<dyn Bean>> {
    let mut sorted: Vec<&Arc<dyn BeanPostProcessor>> = processors.iter().collect();
    sorted.sort_by_key(|p| p.order());

    let mut current = bean;
    for processor in sorted {
        tracing::trace!(
            "Applying '{}' to bean '{}' after initialization",
            processor.name(),
            bean_name
        );
        current = processor.post_process_after_initialization(current, bean_name)?;
    }
    Ok(current)
}
