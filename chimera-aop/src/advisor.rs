//! 通知器（Advisor）
//!
//! 通知器把一个通知和决定其适用范围的切点绑定在一起，并携带排序键。
//! 两种形态：
//! - 普通拦截：包裹目标方法的执行
//! - 引入（Introduction）：给代理增加新的接口能力，不拦截已有方法

use chimera_core::{Bean, BeanClass, Interface, Value};
use std::fmt;
use std::sync::Arc;

use crate::advice::{Advice, MethodInterceptor};
use crate::error::{AopError, AopResult};
use crate::pointcut::{ClassFilter, Pointcut};
use crate::ProceedingJoinPoint;

/// 最高优先级（最先执行，位于链的最外层）
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 最低优先级（默认）
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 引入拦截器
///
/// 处理被引入接口上的方法调用，其余方法交给链上的下一环
pub trait IntroductionInterceptor: MethodInterceptor {
    fn implements_interface(&self, interface: &str) -> bool;
}

/// 把被引入接口的调用委托给另一个对象
pub struct DelegatingIntroductionInterceptor {
    delegate: Arc<dyn Bean>,
    interfaces: Vec<String>,
}

impl DelegatingIntroductionInterceptor {
    /// 委托对象需要实现的接口取自 `delegate.bean_class()`
    pub fn new(delegate: Arc<dyn Bean>) -> Self {
        let interfaces = delegate
            .bean_class()
            .all_interfaces()
            .iter()
            .map(|i| i.name().to_string())
            .collect();
        Self {
            delegate,
            interfaces,
        }
    }
}

impl MethodInterceptor for DelegatingIntroductionInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        if self.implements_interface(invocation.method().declaring_type()) {
            return self.delegate.invoke(invocation.method(), invocation.args());
        }
        invocation.proceed()
    }
}

impl IntroductionInterceptor for DelegatingIntroductionInterceptor {
    fn implements_interface(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i == interface)
    }
}

/// 通知器的两种形态
#[derive(Clone)]
pub enum AdvisorKind {
    /// 普通拦截，`pointcut` 为 `None` 表示无条件匹配所有方法
    Interceptor {
        advice: Advice,
        pointcut: Option<Pointcut>,
    },
    /// 接口引入
    Introduction {
        interfaces: Vec<Arc<Interface>>,
        class_filter: Option<Arc<dyn ClassFilter>>,
    },
}

#[derive(Clone)]
struct AdvisorInner {
    name: String,
    order: i32,
    kind: AdvisorKind,
    interceptor: Arc<dyn MethodInterceptor>,
}

/// 通知器
///
/// 身份按引用判定：克隆出来的句柄与原对象是同一个通知器
#[derive(Clone)]
pub struct Advisor {
    inner: Arc<AdvisorInner>,
}

impl Advisor {
    /// 切点 + 通知
    pub fn new(advice: Advice, pointcut: Pointcut) -> Self {
        Self::interceptor(advice, Some(pointcut))
    }

    /// 无条件通知器，匹配所有方法
    pub fn unconditional(advice: Advice) -> Self {
        Self::interceptor(advice, None)
    }

    fn interceptor(advice: Advice, pointcut: Option<Pointcut>) -> Self {
        let name = match &pointcut {
            Some(p) => format!("{:?}Advisor[{}]", advice.advice_type(), p.description()),
            None => format!("{:?}Advisor", advice.advice_type()),
        };
        let interceptor = advice.to_interceptor();
        Self {
            inner: Arc::new(AdvisorInner {
                name,
                order: LOWEST_PRECEDENCE,
                kind: AdvisorKind::Interceptor { advice, pointcut },
                interceptor,
            }),
        }
    }

    /// 引入通知器
    pub fn introduction<I>(interceptor: Arc<I>, interfaces: Vec<Arc<Interface>>) -> Self
    where
        I: IntroductionInterceptor + 'static,
    {
        let name = format!(
            "IntroductionAdvisor[{}]",
            interfaces
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Self {
            inner: Arc::new(AdvisorInner {
                name,
                order: LOWEST_PRECEDENCE,
                kind: AdvisorKind::Introduction {
                    interfaces,
                    class_filter: None,
                },
                interceptor,
            }),
        }
    }

    /// 限定引入通知器适用的类型；对普通通知器无效
    pub fn with_class_filter(self, filter: impl ClassFilter + 'static) -> Self {
        self.rebuild(|inner| {
            if let AdvisorKind::Introduction { class_filter, .. } = &mut inner.kind {
                *class_filter = Some(Arc::new(filter));
            }
        })
    }

    /// 设置排序值（返回一个新身份的通知器）
    pub fn with_order(self, order: i32) -> Self {
        self.rebuild(|inner| inner.order = order)
    }

    /// 设置名称（返回一个新身份的通知器）
    pub fn named(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.rebuild(|inner| inner.name = name)
    }

    fn rebuild(self, f: impl FnOnce(&mut AdvisorInner)) -> Self {
        let mut inner = Arc::unwrap_or_clone(self.inner);
        f(&mut inner);
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn order(&self) -> i32 {
        self.inner.order
    }

    pub fn kind(&self) -> &AdvisorKind {
        &self.inner.kind
    }

    pub fn is_introduction(&self) -> bool {
        matches!(self.inner.kind, AdvisorKind::Introduction { .. })
    }

    /// 适配好的拦截器
    pub fn method_interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        &self.inner.interceptor
    }

    pub fn pointcut(&self) -> Option<&Pointcut> {
        match &self.inner.kind {
            AdvisorKind::Interceptor { pointcut, .. } => pointcut.as_ref(),
            AdvisorKind::Introduction { .. } => None,
        }
    }

    /// 被引入的接口（普通通知器返回空）
    pub fn introduced_interfaces(&self) -> &[Arc<Interface>] {
        match &self.inner.kind {
            AdvisorKind::Introduction { interfaces, .. } => interfaces,
            AdvisorKind::Interceptor { .. } => &[],
        }
    }

    /// 检查通知器自身是否合法
    pub fn validate(&self) -> AopResult<()> {
        if let AdvisorKind::Introduction { interfaces, .. } = &self.inner.kind {
            if interfaces.is_empty() {
                return Err(AopError::InvalidArgument(format!(
                    "Introduction advisor '{}' must introduce at least one interface",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    /// 类型级别匹配：该通知器是否可能作用于此类型的任一方法
    pub fn can_apply(&self, class: &BeanClass) -> AopResult<bool> {
        match &self.inner.kind {
            AdvisorKind::Interceptor { pointcut: None, .. } => Ok(true),
            AdvisorKind::Interceptor {
                pointcut: Some(pointcut),
                ..
            } => pointcut.can_apply(class),
            AdvisorKind::Introduction { class_filter, .. } => Ok(class_filter
                .as_ref()
                .map_or(true, |filter| filter.matches(class))),
        }
    }

    /// 同一个通知器
    pub fn ptr_eq(&self, other: &Advisor) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Advisor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Advisor {}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor")
            .field("name", &self.inner.name)
            .field("order", &self.inner.order)
            .field("introduction", &self.is_introduction())
            .finish()
    }
}

/// 按排序值稳定升序排列，相同排序值保持原始顺序
pub fn sort_advisors(advisors: &mut [Advisor]) {
    advisors.sort_by_key(Advisor::order);
}
