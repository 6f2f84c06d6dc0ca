//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次被代理拦截的方法调用

use chimera_core::{downcast_value, Bean, BeanClass, Method, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::chain::ChainLink;
use crate::error::AopError;

/// 连接点信息
///
/// 包含方法调用时的上下文信息（只读快照）
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标类型
    pub target_class: Arc<BeanClass>,

    /// 被调用的方法
    pub method: Method,

    /// 方法参数
    pub args: Vec<Value>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    pub fn new(target_class: Arc<BeanClass>, method: Method, args: Vec<Value>) -> Self {
        Self {
            target_class,
            method,
            args,
            timestamp: Instant::now(),
        }
    }

    /// 获取完整的方法签名，例如 `UserService::get_user`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_class.name(), self.method.name())
    }

    pub fn target_type(&self) -> &str {
        self.target_class.name()
    }

    pub fn method_name(&self) -> &str {
        self.method.name()
    }

    /// 尝试以具体类型读取第 `index` 个参数
    pub fn arg<T: Any + Send + Sync>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(downcast_value::<T>)
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("target_type", &self.target_class.name())
            .field("method", &self.method)
            .field("args", &self.args.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 环绕通知的执行链
///
/// 每次代理调用创建一个，持有本次调用的拦截器链和当前位置。
/// 拦截器通过 [`proceed`](Self::proceed) 把调用交给下一环，
/// 链走完后落到目标对象上。
pub struct ProceedingJoinPoint<'a> {
    proxy: Option<Arc<dyn Bean>>,
    target: Option<Arc<dyn Bean>>,
    method: &'a Method,
    target_class: &'a Arc<BeanClass>,
    args: Vec<Value>,
    chain: &'a [ChainLink],
    index: usize,
    started: Instant,
}

impl<'a> ProceedingJoinPoint<'a> {
    pub(crate) fn new(
        proxy: Option<Arc<dyn Bean>>,
        target: Option<Arc<dyn Bean>>,
        method: &'a Method,
        target_class: &'a Arc<BeanClass>,
        args: Vec<Value>,
        chain: &'a [ChainLink],
    ) -> Self {
        Self {
            proxy,
            target,
            method,
            target_class,
            args,
            chain,
            index: 0,
            started: Instant::now(),
        }
    }

    /// 继续执行下一个拦截器，链走完时调用目标方法
    ///
    /// 可以多次调用（例如重试），每次都从当前位置重新走剩余的链
    pub fn proceed(&mut self) -> anyhow::Result<Value> {
        let chain = self.chain;
        let Some(link) = chain.get(self.index) else {
            return self.invoke_target();
        };

        let saved = self.index;
        self.index += 1;
        let result = match link {
            ChainLink::Static(interceptor) => interceptor.invoke(self),
            ChainLink::Dynamic {
                interceptor,
                matcher,
            } => match matcher.matches_args(self.method, self.target_class, &self.args) {
                Ok(true) => interceptor.invoke(self),
                Ok(false) => {
                    tracing::trace!(
                        method = %self.method,
                        "Runtime matcher rejected arguments, skipping interceptor"
                    );
                    self.proceed()
                }
                Err(e) => Err(e),
            },
        };
        self.index = saved;
        result
    }

    fn invoke_target(&self) -> anyhow::Result<Value> {
        match &self.target {
            Some(target) => target.invoke(self.method, &self.args),
            None => Err(AopError::NoTarget(self.method.signature()).into()),
        }
    }

    /// 只读快照，供前置/后置类通知使用
    pub fn join_point(&self) -> JoinPoint {
        JoinPoint {
            target_class: Arc::clone(self.target_class),
            method: self.method.clone(),
            args: self.args.clone(),
            timestamp: self.started,
        }
    }

    pub fn method(&self) -> &Method {
        self.method
    }

    pub fn target_class(&self) -> &Arc<BeanClass> {
        self.target_class
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// 修改后的参数会传给后续拦截器和目标方法
    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    /// 本次调用的目标对象（空目标源时为 `None`）
    pub fn target(&self) -> Option<&Arc<dyn Bean>> {
        self.target.as_ref()
    }

    /// 发起调用的代理对象
    pub fn proxy(&self) -> Option<&Arc<dyn Bean>> {
        self.proxy.as_ref()
    }

    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_class.name(), self.method.name())
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.started.elapsed()
    }
}

impl fmt::Debug for ProceedingJoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("method", self.method)
            .field("target_class", &self.target_class.name())
            .field("chain_len", &self.chain.len())
            .field("index", &self.index)
            .field("has_target", &self.target.is_some())
            .finish()
    }
}
