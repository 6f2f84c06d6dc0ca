//! 代理工厂
//!
//! [`DefaultAopProxyFactory`] 负责在接口代理和子类代理之间做选择，
//! [`ProxyFactory`] 是编程式创建代理的入口。

use chimera_core::{Bean, BeanClass, Interface};
use std::ops::Deref;
use std::sync::Arc;

use crate::advised::AdvisedSupport;
use crate::error::{AopError, AopResult};
use crate::proxy::{
    merge_interfaces, AopProxy, JdkDynamicAopProxy, ProxyHint, ProxyKind, ProxyObject,
    SubclassAopProxy,
};
use crate::target_source::{SingletonTargetSource, TargetSource};

/// 根据配置创建代理后端
pub trait AopProxyFactory: Send + Sync {
    fn create_aop_proxy(&self, advised: Arc<AdvisedSupport>) -> AopResult<Box<dyn AopProxy>>;
}

/// 默认的后端选择策略
///
/// 有可代理的接口且没有要求代理目标类型时使用接口代理，
/// 否则（没有接口、`proxy_target_class` 或 `optimize`）使用子类代理。
/// 目标本身就是接口代理时仍然使用接口代理。
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAopProxyFactory;

impl DefaultAopProxyFactory {
    pub fn decide(&self, advised: &AdvisedSupport) -> AopResult<ProxyKind> {
        let config = advised.config();
        let has_interfaces = !advised.interfaces().is_empty();

        if !(config.optimize || config.proxy_target_class || !has_interfaces) {
            return Ok(ProxyKind::Interface);
        }

        let target_class = advised.target_class().ok_or_else(|| {
            AopError::Configuration(
                "TargetSource cannot determine target class: either an interface or a target \
                 is required for proxy creation"
                    .to_string(),
            )
        })?;

        if has_interfaces && is_interface_proxy_class(&target_class) {
            return Ok(ProxyKind::Interface);
        }
        Ok(ProxyKind::Subclass)
    }
}

impl AopProxyFactory for DefaultAopProxyFactory {
    fn create_aop_proxy(&self, advised: Arc<AdvisedSupport>) -> AopResult<Box<dyn AopProxy>> {
        let kind = self.decide(&advised)?;
        tracing::debug!(kind = ?kind, "Selected proxy backend");
        match kind {
            ProxyKind::Interface => Ok(Box::new(JdkDynamicAopProxy::new(advised)?)),
            ProxyKind::Subclass => Ok(Box::new(SubclassAopProxy::new(advised)?)),
        }
    }
}

/// 生成的接口代理类型：没有父类
fn is_interface_proxy_class(class: &BeanClass) -> bool {
    class.is_generated() && class.super_class().is_none()
}

/// 编程式代理工厂
///
/// 通过 `Deref` 直接暴露 [`AdvisedSupport`] 的全部配置操作。
/// 生成的代理与工厂共享同一份配置，之后的修改对已有代理立即生效。
///
/// ```ignore
/// let factory = ProxyFactory::for_target(Arc::new(UserService::default()));
/// factory.add_advice(Advice::before(|jp| {
///     tracing::info!("→ {}", jp.signature());
///     Ok(())
/// }))?;
/// let proxy = factory.get_proxy()?;
/// ```
pub struct ProxyFactory {
    advised: Arc<AdvisedSupport>,
    aop_proxy_factory: Arc<dyn AopProxyFactory>,
}

impl Default for ProxyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProxyFactory {
    /// 空工厂（没有目标）
    pub fn new() -> Self {
        Self::from_advised(Arc::new(AdvisedSupport::new()))
    }

    pub fn from_advised(advised: Arc<AdvisedSupport>) -> Self {
        Self {
            advised,
            aop_proxy_factory: Arc::new(DefaultAopProxyFactory),
        }
    }

    /// 代理一个固定目标，并代理其实现的全部接口
    pub fn for_target(target: Arc<dyn Bean>) -> Self {
        let class = target.bean_class();
        let factory = Self::for_target_source(Arc::new(SingletonTargetSource::new(target)));
        factory.add_target_interfaces(&class);
        factory
    }

    pub fn for_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        Self::from_advised(Arc::new(AdvisedSupport::with_target_source(target_source)))
    }

    /// 以指定接口代理给定目标源
    pub fn for_interface(interface: Arc<Interface>, target_source: Arc<dyn TargetSource>) -> Self {
        let factory = Self::for_target_source(target_source);
        factory.add_target_interfaces_from(vec![interface]);
        factory
    }

    fn add_target_interfaces(&self, class: &BeanClass) {
        let merged = merge_interfaces(&self.advised.interfaces(), class);
        self.add_target_interfaces_from(merged);
    }

    fn add_target_interfaces_from(&self, interfaces: Vec<Arc<Interface>>) {
        for iface in interfaces {
            // 新建的配置尚未冻结，这里不会失败
            if let Err(e) = self.advised.add_interface(iface) {
                tracing::warn!(error = %e, "Failed to register proxied interface");
            }
        }
    }

    /// 替换后端选择策略
    pub fn set_aop_proxy_factory(&mut self, factory: Arc<dyn AopProxyFactory>) {
        self.aop_proxy_factory = factory;
    }

    pub fn advised(&self) -> &Arc<AdvisedSupport> {
        &self.advised
    }

    pub fn create_aop_proxy(&self) -> AopResult<Box<dyn AopProxy>> {
        self.aop_proxy_factory
            .create_aop_proxy(Arc::clone(&self.advised))
    }

    pub fn get_proxy(&self) -> AopResult<Arc<ProxyObject>> {
        self.create_aop_proxy()?.get_proxy()
    }

    pub fn get_proxy_with_hint(&self, hint: &ProxyHint) -> AopResult<Arc<ProxyObject>> {
        self.create_aop_proxy()?.get_proxy_with_hint(hint)
    }

    /// 创建代理并以 `Arc<dyn Bean>` 返回
    pub fn get_bean(&self) -> AopResult<Arc<dyn Bean>> {
        Ok(self.get_proxy()?)
    }
}

impl Deref for ProxyFactory {
    type Target = AdvisedSupport;

    fn deref(&self) -> &Self::Target {
        &self.advised
    }
}
