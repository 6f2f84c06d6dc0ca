//! Chimera AOP - 面向切面编程支持
//!
//! 提供类似 Spring 的代理式 AOP：
//! - 切点（类过滤器 + 方法匹配器）与切点表达式
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing）以及引入
//! - 接口代理与子类代理，运行时可修改的代理配置
//! - 单例、原型、延迟、池化、热替换等目标源
//! - 通过 BeanPostProcessor 自动为匹配的 Bean 创建代理

pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aspect;
pub mod bean_post_processor;
pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod error_info;
pub mod joinpoint;
pub mod pointcut;
pub mod pool;
pub mod proxy;
pub mod proxy_factory;
pub mod registry;
pub mod target_source;

// 重新导出核心类型
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice,
    MethodInterceptor,
};
pub use advised::{AdvisedSupport, AdvisedSupportListener, ProxyConfig};
pub use advisor::{
    sort_advisors, Advisor, AdvisorKind, DelegatingIntroductionInterceptor,
    IntroductionInterceptor, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE,
};
pub use aspect::{
    aspect_advisor, Aspect, AspectRegistration, ExceptionHandlingAspect, LoggingAspect,
    PerformanceAspect,
};
pub use bean_post_processor::{AdvisorExtender, AopBeanPostProcessor};
pub use chain::ChainLink;
pub use config::{AopProperties, ExhaustedPolicy, PoolProperties};
pub use context::{
    current_join_point, expose_invocation_advisor, AopContext, ExposeInvocationExtender,
    ExposeInvocationInterceptor,
};
pub use error::{AopError, AopResult};
pub use error_info::ErrorInfo;
pub use joinpoint::{JoinPoint, ProceedingJoinPoint};
pub use pointcut::{
    ClassFilter, FnClassFilter, FnMethodMatcher, MethodMatcher, NameMatchMethodMatcher, Pointcut,
    PointcutExpression,
};
pub use pool::{ExhaustedAction, PoolConfig, PoolStats, PooledTargetSource};
pub use proxy::{
    ultimate_target_class, AopProxy, JdkDynamicAopProxy, ProxyHint, ProxyKind, ProxyObject,
    SubclassAopProxy,
};
pub use proxy_factory::{AopProxyFactory, DefaultAopProxyFactory, ProxyFactory};
pub use registry::{global_registry, AdvisorRegistry, DefaultAdvisorRegistry};
pub use target_source::{
    EmptyTargetSource, FunctionFactory, HotSwappableTargetSource, LazyInitTargetSource,
    ObjectFactory, PrototypeTargetSource, SingletonTargetSource, TargetSource,
};

// 对象模型来自容器核心
pub use chimera_core::{value, Bean, BeanClass, Interface, Method, Value};

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advisor::{Advisor, HIGHEST_PRECEDENCE, LOWEST_PRECEDENCE};
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::bean_post_processor::AopBeanPostProcessor;
    pub use crate::context::{current_join_point, AopContext};
    pub use crate::error::{AopError, AopResult};
    pub use crate::error_info::ErrorInfo;
    pub use crate::joinpoint::{JoinPoint, ProceedingJoinPoint};
    pub use crate::pointcut::{Pointcut, PointcutExpression};
    pub use crate::proxy::{ProxyKind, ProxyObject};
    pub use crate::proxy_factory::ProxyFactory;
    pub use crate::registry::{global_registry, AdvisorRegistry, DefaultAdvisorRegistry};
    pub use crate::target_source::TargetSource;
    pub use crate::{aop_call, submit_aspect};
}

/// 按名称调用对象（通常是代理）上的方法，参数自动包装成 [`Value`]
///
/// 使用示例：
/// ```ignore
/// use chimera_aop::aop_call;
///
/// let user = aop_call!(proxy, "find_user", 42u32)?;
/// ```
#[macro_export]
macro_rules! aop_call {
    ($bean:expr, $method:expr $(, $arg:expr)* $(,)?) => {
        $crate::Bean::call(&*$bean, $method, &[$($crate::value($arg)),*])
    };
}

/// 通过 inventory 注册切面，全局通知器注册表第一次访问时加载
///
/// ```ignore
/// chimera_aop::submit_aspect!("auditAspect", || {
///     std::sync::Arc::new(AuditAspect::default())
/// });
/// ```
#[macro_export]
macro_rules! submit_aspect {
    ($name:expr, $creator:expr) => {
        $crate::inventory::submit! {
            $crate::AspectRegistration::new($name, $creator)
        }
    };
}
