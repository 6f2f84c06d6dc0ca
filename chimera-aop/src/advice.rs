//! 通知（Advice）定义
//!
//! 所有通知最终都会被适配成 [`MethodInterceptor`]，
//! 调用链只认识拦截器这一种形态。

use chimera_core::Value;
use std::fmt;
use std::sync::Arc;

use crate::error_info::ErrorInfo;
use crate::{JoinPoint, ProceedingJoinPoint};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（抛出异常时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
}

/// 方法拦截器（环绕通知）
///
/// 可以完全控制目标方法的执行：调用 `invocation.proceed()` 继续，
/// 或者直接返回以短路后续的链。
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value>;
}

impl<F> MethodInterceptor for F
where
    F: Fn(&mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        self(invocation)
    }
}

/// 前置通知
///
/// 在目标方法执行前调用，返回错误会中止本次调用
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()>;
}

/// 后置通知
///
/// 在目标方法执行后调用（无论成功还是失败）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, join_point: &JoinPoint);
}

/// 返回后通知
///
/// 在目标方法成功返回后调用，返回错误会替换原本的返回值
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, join_point: &JoinPoint, result: &Value) -> anyhow::Result<()>;
}

/// 异常通知
///
/// 在目标方法抛出异常时调用，原始错误仍然继续向上传播
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(&self, join_point: &JoinPoint, error: &ErrorInfo);
}

/// 一个通知单元
#[derive(Clone)]
pub enum Advice {
    Around(Arc<dyn MethodInterceptor>),
    Before(Arc<dyn BeforeAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    After(Arc<dyn AfterAdvice>),
}

impl Advice {
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(f))
    }

    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(FnBefore(f)))
    }

    pub fn after_returning<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::AfterReturning(Arc::new(FnAfterReturning(f)))
    }

    pub fn after_throwing<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint, &ErrorInfo) + Send + Sync + 'static,
    {
        Advice::AfterThrowing(Arc::new(FnAfterThrowing(f)))
    }

    pub fn after<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint) + Send + Sync + 'static,
    {
        Advice::After(Arc::new(FnAfter(f)))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Around(_) => AdviceType::Around,
            Advice::Before(_) => AdviceType::Before,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::After(_) => AdviceType::After,
        }
    }

    /// 适配为拦截器
    pub fn to_interceptor(&self) -> Arc<dyn MethodInterceptor> {
        match self {
            Advice::Around(interceptor) => Arc::clone(interceptor),
            Advice::Before(advice) => Arc::new(BeforeInterceptor(Arc::clone(advice))),
            Advice::AfterReturning(advice) => {
                Arc::new(AfterReturningInterceptor(Arc::clone(advice)))
            }
            Advice::AfterThrowing(advice) => {
                Arc::new(AfterThrowingInterceptor(Arc::clone(advice)))
            }
            Advice::After(advice) => Arc::new(AfterInterceptor(Arc::clone(advice))),
        }
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice::{:?}", self.advice_type())
    }
}

struct FnBefore<F>(F);

impl<F> BeforeAdvice for FnBefore<F>
where
    F: Fn(&JoinPoint) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint) -> anyhow::Result<()> {
        (self.0)(join_point)
    }
}

struct FnAfterReturning<F>(F);

impl<F> AfterReturningAdvice for FnAfterReturning<F>
where
    F: Fn(&JoinPoint, &Value) -> anyhow::Result<()> + Send + Sync,
{
    fn after_returning(&self, join_point: &JoinPoint, result: &Value) -> anyhow::Result<()> {
        (self.0)(join_point, result)
    }
}

struct FnAfterThrowing<F>(F);

impl<F> AfterThrowingAdvice for FnAfterThrowing<F>
where
    F: Fn(&JoinPoint, &ErrorInfo) + Send + Sync,
{
    fn after_throwing(&self, join_point: &JoinPoint, error: &ErrorInfo) {
        (self.0)(join_point, error)
    }
}

struct FnAfter<F>(F);

impl<F> AfterAdvice for FnAfter<F>
where
    F: Fn(&JoinPoint) + Send + Sync,
{
    fn after(&self, join_point: &JoinPoint) {
        (self.0)(join_point)
    }
}

// ============================================================================
// 通知到拦截器的适配器
// ============================================================================

struct BeforeInterceptor(Arc<dyn BeforeAdvice>);

impl MethodInterceptor for BeforeInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        self.0.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

struct AfterReturningInterceptor(Arc<dyn AfterReturningAdvice>);

impl MethodInterceptor for AfterReturningInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        let result = invocation.proceed()?;
        self.0.after_returning(&invocation.join_point(), &result)?;
        Ok(result)
    }
}

struct AfterThrowingInterceptor(Arc<dyn AfterThrowingAdvice>);

impl MethodInterceptor for AfterThrowingInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        invocation.proceed().inspect_err(|err| {
            self.0
                .after_throwing(&invocation.join_point(), &ErrorInfo::from_anyhow(err));
        })
    }
}

struct AfterInterceptor(Arc<dyn AfterAdvice>);

impl MethodInterceptor for AfterInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        let result = invocation.proceed();
        self.0.after(&invocation.join_point());
        result
    }
}
