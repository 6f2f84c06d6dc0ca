//! 代理对象与两种代理后端
//!
//! - [`JdkDynamicAopProxy`]：接口代理，只暴露声明（和显式添加）的接口
//! - [`SubclassAopProxy`]：子类代理，覆盖目标类型上的全部可覆盖方法
//!
//! 两种后端生成的都是 [`ProxyObject`]，区别在于方法解析规则和代理类型的形状。
//! 每次调用：解析方法 → 借出目标 → 构建（或命中缓存的）拦截器链 → 执行 → 归还目标。

use chimera_core::{Bean, BeanClass, Instantiation, Interface, Method, Value};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::advised::AdvisedSupport;
use crate::context::AopContext;
use crate::error::{AopError, AopResult};
use crate::target_source::TargetSource;
use crate::ProceedingJoinPoint;

static PROXY_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// 生成的代理类型名称后缀
pub const SUBCLASS_PROXY_MARKER: &str = "$$ChimeraProxy$";

/// 代理后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    /// 基于接口
    Interface,
    /// 基于子类
    Subclass,
}

/// 代理类型定义位置的提示（不透明的命名空间标记）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyHint {
    namespace: String,
}

impl ProxyHint {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn qualify(hint: Option<&ProxyHint>, name: String) -> String {
        match hint {
            Some(hint) if !hint.namespace.is_empty() => format!("{}::{}", hint.namespace, name),
            _ => name,
        }
    }
}

/// 代理后端
pub trait AopProxy: Send + Sync {
    fn kind(&self) -> ProxyKind;

    fn get_proxy(&self) -> AopResult<Arc<ProxyObject>> {
        self.create(None)
    }

    fn get_proxy_with_hint(&self, hint: &ProxyHint) -> AopResult<Arc<ProxyObject>> {
        self.create(Some(hint))
    }

    fn create(&self, hint: Option<&ProxyHint>) -> AopResult<Arc<ProxyObject>>;
}

fn check_has_something_to_proxy(advised: &AdvisedSupport) -> AopResult<()> {
    if advised.advisor_count() == 0 && advised.target_class().is_none() {
        return Err(AopError::Configuration(
            "No advisors and no target specified".to_string(),
        ));
    }
    Ok(())
}

/// 接口代理后端
pub struct JdkDynamicAopProxy {
    advised: Arc<AdvisedSupport>,
}

impl JdkDynamicAopProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> AopResult<Self> {
        check_has_something_to_proxy(&advised)?;
        Ok(Self { advised })
    }
}

impl AopProxy for JdkDynamicAopProxy {
    fn kind(&self) -> ProxyKind {
        ProxyKind::Interface
    }

    fn create(&self, hint: Option<&ProxyHint>) -> AopResult<Arc<ProxyObject>> {
        let interfaces = self.advised.interfaces();
        if interfaces.is_empty() {
            return Err(AopError::Configuration(
                "Interface-based proxy requires at least one proxied interface".to_string(),
            ));
        }

        let id = PROXY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = ProxyHint::qualify(hint, format!("$Proxy{}", id));
        let proxy_class = BeanClass::builder(name)
            .implements_all(interfaces)
            .generated()
            .build();

        Ok(ProxyObject::create(
            Arc::clone(&self.advised),
            ProxyKind::Interface,
            proxy_class,
        ))
    }
}

/// 子类代理后端
///
/// 目标类型必须可以被继承，并且存在可访问的实例化途径；
/// final 方法无法被覆盖，调用时不经过通知直接落到目标上
pub struct SubclassAopProxy {
    advised: Arc<AdvisedSupport>,
}

impl SubclassAopProxy {
    pub fn new(advised: Arc<AdvisedSupport>) -> AopResult<Self> {
        check_has_something_to_proxy(&advised)?;
        Ok(Self { advised })
    }

    fn validate_class(&self, class: &BeanClass) -> AopResult<()> {
        if class.is_final() {
            return Err(AopError::Configuration(format!(
                "Cannot generate subclass proxy for final class '{}'",
                class.name()
            )));
        }

        match class.instantiation() {
            Instantiation::Synthesized => Ok(()),
            Instantiation::Constructor(ctor) => {
                ctor().map_err(|source| AopError::ProxyGeneration {
                    class: class.name().to_string(),
                    source,
                })
            }
            Instantiation::Inaccessible => Err(AopError::Configuration(format!(
                "Cannot generate subclass proxy for '{}': no accessible instantiation path",
                class.name()
            ))),
        }
    }
}

impl AopProxy for SubclassAopProxy {
    fn kind(&self) -> ProxyKind {
        ProxyKind::Subclass
    }

    fn create(&self, hint: Option<&ProxyHint>) -> AopResult<Arc<ProxyObject>> {
        let root = self.advised.target_class().ok_or_else(|| {
            AopError::Configuration(
                "Target class must be available for creating a subclass proxy".to_string(),
            )
        })?;
        let user_class = root.user_class();
        self.validate_class(&user_class)?;

        for method in user_class.all_methods().iter().filter(|m| m.is_final()) {
            tracing::warn!(
                method = %method,
                "Unable to proxy final method: calls will not be routed through advice"
            );
        }

        let id = PROXY_COUNTER.fetch_add(1, Ordering::Relaxed);
        let name = ProxyHint::qualify(
            hint,
            format!("{}{}{}", user_class.name(), SUBCLASS_PROXY_MARKER, id),
        );
        let proxy_class = BeanClass::builder(name)
            .extends(user_class)
            .implements_all(self.advised.interfaces())
            .generated()
            .build();

        Ok(ProxyObject::create(
            Arc::clone(&self.advised),
            ProxyKind::Subclass,
            proxy_class,
        ))
    }
}

/// 代理实例
///
/// 自身不保存任何单次调用的可变状态，可以被多个线程并发调用
pub struct ProxyObject {
    advised: Arc<AdvisedSupport>,
    kind: ProxyKind,
    proxy_class: Arc<BeanClass>,
    methods: Vec<Method>,
    opaque: bool,
    this: Weak<ProxyObject>,
}

impl ProxyObject {
    fn create(
        advised: Arc<AdvisedSupport>,
        kind: ProxyKind,
        proxy_class: Arc<BeanClass>,
    ) -> Arc<Self> {
        let methods = proxy_class.all_methods();
        let opaque = advised.is_opaque();
        advised.activate();

        tracing::info!(
            proxy_class = proxy_class.name(),
            kind = ?kind,
            advisors = advised.advisor_count(),
            "Created AOP proxy"
        );

        Arc::new_cyclic(|this| Self {
            advised,
            kind,
            proxy_class,
            methods,
            opaque,
            this: this.clone(),
        })
    }

    pub fn kind(&self) -> ProxyKind {
        self.kind
    }

    pub fn proxy_class(&self) -> &Arc<BeanClass> {
        &self.proxy_class
    }

    /// 代理的配置；不透明代理返回 `None`
    pub fn advised(&self) -> Option<&Arc<AdvisedSupport>> {
        (!self.opaque).then_some(&self.advised)
    }

    /// 把方法解析为代理暴露的声明
    fn resolve(&self, method: &Method) -> AopResult<Method> {
        let exact = self.methods.iter().find(|m| {
            m.declaring_type() == method.declaring_type() && m.same_signature(method)
        });
        let found = exact.or_else(|| self.methods.iter().find(|m| m.same_signature(method)));
        if let Some(found) = found {
            return Ok(found.clone());
        }

        match self.kind {
            ProxyKind::Interface => Err(AopError::MethodNotExposed {
                method: method.signature(),
                interfaces: self
                    .proxy_class
                    .all_interfaces()
                    .iter()
                    .map(|i| i.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
            ProxyKind::Subclass => Err(chimera_core::ContainerError::NoSuchMethod {
                class: self.proxy_class.name().to_string(),
                method: method.name().to_string(),
            }
            .into()),
        }
    }

    fn dispatch(&self, method: &Method, args: &[Value]) -> anyhow::Result<Value> {
        let method = self.resolve(method)?;
        let this: Option<Arc<dyn Bean>> = self.this.upgrade().map(|p| p as Arc<dyn Bean>);

        let _exposed = match &this {
            Some(proxy) if self.advised.is_expose_proxy() => {
                Some(AopContext::expose(Arc::clone(proxy)))
            }
            _ => None,
        };

        let target_source = self.advised.target_source();
        let lease = TargetLease::acquire(target_source.as_ref())?;

        if self.kind == ProxyKind::Subclass && method.is_final() {
            tracing::trace!(method = %method, "Final method bypasses advice");
            let result = lease.invoke_directly(&method, args);
            return lease.finish(result);
        }

        let match_class = self.resolve_target_class(lease.target(), target_source.as_ref());
        let chain = match self.advised.interceptors_for(&method, &match_class) {
            Ok(chain) => chain,
            Err(e) => return lease.finish(Err(e.into())),
        };

        let result = if chain.is_empty() {
            lease.invoke_directly(&method, args)
        } else {
            ProceedingJoinPoint::new(
                this,
                lease.target().cloned(),
                &method,
                &match_class,
                args.to_vec(),
                &chain,
            )
            .proceed()
        };
        lease.finish(result)
    }

    /// 匹配使用目标的运行时类型，并跳过生成的代理类型
    fn resolve_target_class(
        &self,
        target: Option<&Arc<dyn Bean>>,
        source: &dyn TargetSource,
    ) -> Arc<BeanClass> {
        let class = match target {
            Some(target) => ultimate_target_class(target),
            None => source
                .target_class()
                .unwrap_or_else(|| Arc::clone(&self.proxy_class)),
        };
        class.user_class()
    }
}

impl Bean for ProxyObject {
    fn bean_class(&self) -> Arc<BeanClass> {
        Arc::clone(&self.proxy_class)
    }

    fn invoke(&self, method: &Method, args: &[Value]) -> anyhow::Result<Value> {
        self.dispatch(method, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ProxyObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyObject")
            .field("kind", &self.kind)
            .field("proxy_class", &self.proxy_class.name())
            .field("advised", &self.advised)
            .finish()
    }
}

/// 找到代理背后最终的目标类型
///
/// 对非透明代理逐层向下；普通对象返回其用户类型
pub fn ultimate_target_class(bean: &Arc<dyn Bean>) -> Arc<BeanClass> {
    if let Some(proxy) = bean.as_any().downcast_ref::<ProxyObject>() {
        if let Some(advised) = proxy.advised() {
            let source = advised.target_source();
            if source.is_static() {
                if let Ok(Some(target)) = source.get_target() {
                    return ultimate_target_class(&target);
                }
            }
            if let Some(class) = source.target_class() {
                return class.user_class();
            }
        }
    }
    bean.bean_class().user_class()
}

/// 接口代理需要暴露的接口：配置中已有的接口加上目标实现的全部接口
pub(crate) fn merge_interfaces(
    existing: &[Arc<Interface>],
    target: &BeanClass,
) -> Vec<Arc<Interface>> {
    let mut merged: Vec<Arc<Interface>> = existing.to_vec();
    for iface in target.all_interfaces() {
        if !merged.iter().any(|i| i.name() == iface.name()) {
            merged.push(iface);
        }
    }
    merged
}

/// 一次调用借出的目标
///
/// 非静态目标源上借出的目标在所有退出路径上都会归还恰好一次（包括 panic）
struct TargetLease<'a> {
    source: &'a dyn TargetSource,
    target: Option<Arc<dyn Bean>>,
    pending_release: Option<Arc<dyn Bean>>,
}

impl<'a> TargetLease<'a> {
    fn acquire(source: &'a dyn TargetSource) -> AopResult<Self> {
        let target = source.get_target()?;
        let pending_release = match &target {
            Some(t) if !source.is_static() => Some(Arc::clone(t)),
            _ => None,
        };
        Ok(Self {
            source,
            target,
            pending_release,
        })
    }

    fn target(&self) -> Option<&Arc<dyn Bean>> {
        self.target.as_ref()
    }

    fn invoke_directly(&self, method: &Method, args: &[Value]) -> anyhow::Result<Value> {
        match &self.target {
            Some(target) => target.invoke(method, args),
            None => Err(AopError::NoTarget(method.signature()).into()),
        }
    }

    /// 归还目标并合并结果：调用失败时原始错误优先，归还错误只记录日志
    fn finish(mut self, result: anyhow::Result<Value>) -> anyhow::Result<Value> {
        let Some(target) = self.pending_release.take() else {
            return result;
        };

        match (result, self.source.release_target(target)) {
            (result, Ok(())) => result,
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(call_err), Err(release_err)) => {
                tracing::warn!(
                    error = %release_err,
                    "Failed to release target after failed invocation"
                );
                Err(call_err)
            }
        }
    }
}

impl Drop for TargetLease<'_> {
    fn drop(&mut self) {
        if let Some(target) = self.pending_release.take() {
            if let Err(e) = self.source.release_target(target) {
                tracing::warn!(error = %e, "Failed to release target during unwind");
            }
        }
    }
}
