//! 调用上下文
//!
//! 两个线程内的槽位：
//! - 当前代理：`expose_proxy` 开启时由代理在调用期间发布，用于自调用
//! - 当前连接点：由 [`ExposeInvocationInterceptor`] 发布
//!
//! 每次发布都返回一个守卫，守卫释放时恢复之前的值（包括“没有值”），
//! 因此嵌套和重入调用能够正确还原。

use chimera_core::{Bean, Value};
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::{Advisor, HIGHEST_PRECEDENCE};
use crate::bean_post_processor::AdvisorExtender;
use crate::error::{AopError, AopResult};
use crate::{JoinPoint, ProceedingJoinPoint};

thread_local! {
    static CURRENT_PROXY: RefCell<Option<Arc<dyn Bean>>> = const { RefCell::new(None) };
    static CURRENT_INVOCATION: RefCell<Option<JoinPoint>> = const { RefCell::new(None) };
}

/// 访问当前线程的代理上下文
pub struct AopContext;

impl AopContext {
    /// 当前线程正在执行的代理
    ///
    /// 没有暴露代理时返回 [`AopError::ProxyNotExposed`]
    pub fn current_proxy() -> AopResult<Arc<dyn Bean>> {
        CURRENT_PROXY
            .with(|slot| slot.borrow().clone())
            .ok_or(AopError::ProxyNotExposed)
    }

    pub fn has_current_proxy() -> bool {
        CURRENT_PROXY.with(|slot| slot.borrow().is_some())
    }

    /// 发布代理，返回的守卫释放时恢复之前的值
    pub(crate) fn expose(proxy: Arc<dyn Bean>) -> ExposedProxy {
        let previous = CURRENT_PROXY.with(|slot| slot.borrow_mut().replace(proxy));
        ExposedProxy {
            previous,
            _not_send: PhantomData,
        }
    }
}

/// 代理发布守卫
#[must_use = "the proxy is unexposed as soon as the guard is dropped"]
pub struct ExposedProxy {
    previous: Option<Arc<dyn Bean>>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ExposedProxy {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_PROXY.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// 当前线程正在执行的被通知调用
pub fn current_join_point() -> AopResult<JoinPoint> {
    CURRENT_INVOCATION
        .with(|slot| slot.borrow().clone())
        .ok_or(AopError::InvocationNotExposed)
}

struct ExposedInvocation {
    previous: Option<JoinPoint>,
    _not_send: PhantomData<*const ()>,
}

impl ExposedInvocation {
    fn expose(join_point: JoinPoint) -> Self {
        let previous = CURRENT_INVOCATION.with(|slot| slot.borrow_mut().replace(join_point));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }
}

impl Drop for ExposedInvocation {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_INVOCATION.with(|slot| *slot.borrow_mut() = previous);
    }
}

/// 把当前连接点发布到线程槽位
///
/// 需要位于链的最外层，内层的通知才能通过 [`current_join_point`] 读取
pub struct ExposeInvocationInterceptor;

impl MethodInterceptor for ExposeInvocationInterceptor {
    fn invoke(&self, invocation: &mut ProceedingJoinPoint<'_>) -> anyhow::Result<Value> {
        let _exposed = ExposedInvocation::expose(invocation.join_point());
        invocation.proceed()
    }
}

static EXPOSE_INVOCATION_ADVISOR: Lazy<Advisor> = Lazy::new(|| {
    Advisor::unconditional(Advice::Around(Arc::new(ExposeInvocationInterceptor)))
        .with_order(HIGHEST_PRECEDENCE)
        .named("ExposeInvocationInterceptor")
});

/// 全局唯一的连接点发布通知器
pub fn expose_invocation_advisor() -> Advisor {
    EXPOSE_INVOCATION_ADVISOR.clone()
}

/// 自动代理扩展：在非空的通知器链最前面加上连接点发布通知器
pub struct ExposeInvocationExtender;

impl AdvisorExtender for ExposeInvocationExtender {
    fn extend(&self, advisors: &mut Vec<Advisor>) {
        if advisors.is_empty() {
            return;
        }
        let advisor = expose_invocation_advisor();
        if !advisors.contains(&advisor) {
            advisors.insert(0, advisor);
        }
    }
}
