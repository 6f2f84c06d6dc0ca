//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化：一个切点表达式加上一组回调。
//! 注册到通知器注册表时，每个切面被转换成一个环绕通知器。

use chimera_core::Value;
use std::sync::Arc;

use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::{Advisor, LOWEST_PRECEDENCE};
use crate::error_info::ErrorInfo;
use crate::pointcut::Pointcut;
use crate::{JoinPoint, PointcutExpression, ProceedingJoinPoint};

/// 切面 Trait
///
/// 实现此 trait 以定义切面逻辑
pub trait Aspect: Send + Sync {
    /// 切面名称
    fn name(&self) -> &str;

    /// 切点表达式
    fn pointcut(&self) -> &PointcutExpression;

    /// 排序值，越小越靠外层
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// 前置通知（可选实现）
    fn before(&self, _join_point: &JoinPoint) {}

    /// 后置通知（可选实现）
    fn after(&self, _join_point: &JoinPoint) {}

    /// 返回后通知（可选实现）
    /// 当方法正常返回时调用
    fn after_returning(&self, _join_point: &JoinPoint, _result: &Value) {}

    /// 异常通知（可选实现）
    fn after_throwing(&self, _join_point: &JoinPoint, _error: &ErrorInfo) {}
}

/// 切面注册器
///
/// 用于 inventory 自动收集和注册切面
pub struct AspectRegistration {
    /// 切面名称（同时作为通知器名称）
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn Aspect>) -> Self {
        Self { name, creator }
    }

    /// 创建切面实例
    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.creator)()
    }
}

// 使用 inventory 收集所有切面注册器
inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

/// 按 before → 目标 → after_returning / after_throwing → after 的顺序驱动切面回调
struct AspectInterceptor {
    aspect: Arc<dyn Aspect>,
}

impl MethodInterceptor for AspectInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        let join_point = invocation.join_point();
        self.aspect.before(&join_point);

        let result = invocation.proceed();
        match &result {
            Ok(value) => self.aspect.after_returning(&join_point, value),
            Err(error) => self
                .aspect
                .after_throwing(&join_point, &ErrorInfo::from_anyhow(error)),
        }

        self.aspect.after(&join_point);
        result
    }
}

/// 把切面转换成通知器
pub fn aspect_advisor(aspect: Arc<dyn Aspect>) -> Advisor {
    let pointcut = Pointcut::expression(aspect.pointcut().clone());
    let order = aspect.order();
    let name = aspect.name().to_string();
    Advisor::new(Advice::Around(Arc::new(AspectInterceptor { aspect })), pointcut)
        .with_order(order)
        .named(name)
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面 - 记录方法调用
pub struct LoggingAspect {
    log_args: bool,
    log_result: bool,
    pointcut: PointcutExpression,
}

impl LoggingAspect {
    pub fn new(pointcut: PointcutExpression) -> Self {
        Self {
            log_args: false,
            log_result: false,
            pointcut,
        }
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }

    pub fn with_result(mut self) -> Self {
        self.log_result = true;
        self
    }
}

impl Aspect for LoggingAspect {
    fn name(&self) -> &str {
        "LoggingAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn before(&self, join_point: &JoinPoint) {
        if self.log_args {
            tracing::info!(
                "→ Entering: {} with {} argument(s)",
                join_point.signature(),
                join_point.args.len()
            );
        } else {
            tracing::info!("→ Entering: {}", join_point.signature());
        }
    }

    fn after_returning(&self, join_point: &JoinPoint, result: &Value) {
        if self.log_result {
            tracing::info!("✓ Returned: {} -> {:?}", join_point.signature(), result);
        }
    }

    fn after(&self, join_point: &JoinPoint) {
        let elapsed = join_point.timestamp.elapsed();
        tracing::info!("← Exiting: {} (took {:?})", join_point.signature(), elapsed);
    }
}

/// 性能监控切面
pub struct PerformanceAspect {
    threshold_ms: u128,
    pointcut: PointcutExpression,
}

impl PerformanceAspect {
    pub fn new(threshold_ms: u128, pointcut: PointcutExpression) -> Self {
        Self {
            threshold_ms,
            pointcut,
        }
    }
}

impl Aspect for PerformanceAspect {
    fn name(&self) -> &str {
        "PerformanceAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn after(&self, join_point: &JoinPoint) {
        let elapsed = join_point.timestamp.elapsed().as_millis();
        if elapsed > self.threshold_ms {
            tracing::warn!(
                "⚠️ Slow method detected: {} took {}ms (threshold: {}ms)",
                join_point.signature(),
                elapsed,
                self.threshold_ms
            );
        }
    }
}

/// 异常处理切面
pub struct ExceptionHandlingAspect {
    pointcut: PointcutExpression,
}

impl ExceptionHandlingAspect {
    pub fn new(pointcut: PointcutExpression) -> Self {
        Self { pointcut }
    }
}

impl Aspect for ExceptionHandlingAspect {
    fn name(&self) -> &str {
        "ExceptionHandlingAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: &ErrorInfo) {
        tracing::error!(
            "❌ Exception in {}: {}",
            join_point.signature(),
            error.full_description()
        );
    }
}
