//! AOP BeanPostProcessor - 自动代理创建器
//!
//! 在 Bean 初始化后，从通知器注册表中找出适用于该 Bean 类型的通知器，
//! 有适用的通知器时返回一个代理替换原对象。

use chimera_core::prelude::*;
use chimera_core::ClassKey;
use dashmap::DashMap;
use std::sync::Arc;

use crate::advisor::{sort_advisors, Advisor};
use crate::config::AopProperties;
use crate::context::ExposeInvocationExtender;
use crate::error::{AopError, AopResult};
use crate::proxy::{ultimate_target_class, ProxyHint, ProxyObject};
use crate::proxy_factory::ProxyFactory;
use crate::registry::AdvisorRegistry;

/// 自动代理扩展点：在排序之后追加框架必需的通知器
///
/// 扩展器看到的列表已经按顺序值排好，加入的通知器保持它放入的位置
pub trait AdvisorExtender: Send + Sync {
    fn extend(&self, advisors: &mut Vec<Advisor>);
}

/// 某个类型的匹配结果
///
/// 一旦写入就不再失效：之后注册的通知器不会应用到已经判定过的类型上
enum Eligibility {
    Ineligible,
    Eligible(Arc<[Advisor]>),
}

impl Eligibility {
    fn advisors(&self) -> Arc<[Advisor]> {
        match self {
            Eligibility::Ineligible => Arc::from(Vec::new()),
            Eligibility::Eligible(advisors) => Arc::clone(advisors),
        }
    }
}

/// AOP BeanPostProcessor
///
/// ## 工作原理
///
/// 1. 基础设施类型和通知器自身不处理
/// 2. 从注册表取出全部候选通知器，跳过正在创建中的通知器
/// 3. 用通知器的类过滤器筛选出适用于目标类型的通知器并排序，再交给扩展器追加
/// 4. 已经是可修改的代理时，把通知器直接加入它的配置；否则创建新代理
///
/// ## 使用示例
///
/// ```ignore
/// use chimera_aop::{global_registry, AopBeanPostProcessor};
///
/// let processor = AopBeanPostProcessor::new(global_registry().clone());
/// let bean = processor.post_process_after_initialization(bean, "userService")?;
/// ```
pub struct AopBeanPostProcessor {
    registry: Arc<dyn AdvisorRegistry>,
    properties: AopProperties,
    extenders: Vec<Arc<dyn AdvisorExtender>>,
    hint: Option<ProxyHint>,
    eligible: DashMap<ClassKey, Eligibility>,
}

impl AopBeanPostProcessor {
    pub fn new(registry: Arc<dyn AdvisorRegistry>) -> Self {
        Self::with_properties(registry, AopProperties::default())
    }

    pub fn with_properties(registry: Arc<dyn AdvisorRegistry>, properties: AopProperties) -> Self {
        let mut extenders: Vec<Arc<dyn AdvisorExtender>> = Vec::new();
        if properties.expose_invocation {
            extenders.push(Arc::new(ExposeInvocationExtender));
        }
        Self {
            registry,
            properties,
            extenders,
            hint: None,
            eligible: DashMap::new(),
        }
    }

    /// 使用 `chimera.aop.*` 配置创建
    pub fn from_environment(
        registry: Arc<dyn AdvisorRegistry>,
        env: &Environment,
    ) -> AopResult<Self> {
        Ok(Self::with_properties(
            registry,
            AopProperties::from_environment(env)?,
        ))
    }

    /// 创建禁用的处理器
    pub fn disabled(registry: Arc<dyn AdvisorRegistry>) -> Self {
        Self::with_properties(
            registry,
            AopProperties {
                enabled: false,
                ..AopProperties::default()
            },
        )
    }

    pub fn with_extender(mut self, extender: Arc<dyn AdvisorExtender>) -> Self {
        self.extenders.push(extender);
        self
    }

    /// 生成的代理类型所在的命名空间
    pub fn with_proxy_hint(mut self, hint: ProxyHint) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn properties(&self) -> &AopProperties {
        &self.properties
    }

    /// 已缓存匹配结果的类型数量
    pub fn cached_type_count(&self) -> usize {
        self.eligible.len()
    }

    fn name_allowed(&self, name: &str) -> bool {
        match &self.properties.advisor_name_prefix {
            Some(prefix) => name.starts_with(prefix.as_str()),
            None => true,
        }
    }

    /// 适用于给定类型的通知器，已排序
    ///
    /// 有通知器因为正在创建而被跳过时，结果不进入缓存
    pub fn eligible_advisors(&self, class: &BeanClass) -> AopResult<Arc<[Advisor]>> {
        let key = class.key();
        if let Some(cached) = self.eligible.get(&key) {
            return Ok(cached.advisors());
        }

        let names = self.registry.advisor_names();

        let mut complete = true;
        let mut candidates = Vec::new();
        for name in names.iter().filter(|n| self.name_allowed(n)) {
            if self.registry.is_currently_in_creation(name) {
                tracing::debug!("Skipping currently created advisor '{}'", name);
                complete = false;
                continue;
            }
            match self.registry.get_advisor(name) {
                Ok(advisor) => candidates.push(advisor),
                Err(AopError::Container(ContainerError::BeanCurrentlyInCreation(_))) => {
                    tracing::debug!("Skipping currently created advisor '{}'", name);
                    complete = false;
                }
                Err(e) => return Err(e),
            }
        }

        let mut eligible = Vec::new();
        for advisor in candidates {
            if advisor.can_apply(class)? {
                eligible.push(advisor);
            }
        }

        sort_advisors(&mut eligible);
        if !eligible.is_empty() {
            for extender in &self.extenders {
                extender.extend(&mut eligible);
            }
        }

        let advisors: Arc<[Advisor]> = eligible.into();
        if complete {
            let entry = if advisors.is_empty() {
                Eligibility::Ineligible
            } else {
                Eligibility::Eligible(Arc::clone(&advisors))
            };
            tracing::debug!(
                class = class.name(),
                advisors = advisors.len(),
                "Cached advisor eligibility"
            );
            self.eligible.insert(key, entry);
        }
        Ok(advisors)
    }

    fn should_skip(&self, class: &BeanClass, bean_name: &str) -> bool {
        class.is_infrastructure() || self.registry.advisor_names().iter().any(|n| n == bean_name)
    }

    fn wrap_if_necessary(&self, bean: Arc<dyn Bean>, bean_name: &str) -> AopResult<Arc<dyn Bean>> {
        if self.should_skip(&bean.bean_class(), bean_name) {
            tracing::trace!("Bean '{}' is infrastructure, skipping AOP wrapping", bean_name);
            return Ok(bean);
        }

        let target_class = ultimate_target_class(&bean);
        let advisors = self.eligible_advisors(&target_class)?;
        if advisors.is_empty() {
            tracing::trace!(
                "Bean '{}' does not match any advisor, skipping AOP wrapping",
                bean_name
            );
            return Ok(bean);
        }

        if let Some(advised) = bean
            .as_any()
            .downcast_ref::<ProxyObject>()
            .and_then(ProxyObject::advised)
            .filter(|advised| !advised.is_frozen())
            .cloned()
        {
            let missing: Vec<Advisor> = advisors
                .iter()
                .filter(|a| advised.index_of(a).is_none())
                .cloned()
                .collect();
            let added = missing.len();
            if self.properties.apply_advisors_first {
                advised.add_advisors_at(0, missing)?;
            } else {
                advised.add_advisors(missing)?;
            }
            tracing::info!(
                "🔷 [AOP] Added {} advisor(s) to existing proxy of '{}'",
                added,
                bean_name
            );
            return Ok(bean);
        }

        let factory = ProxyFactory::for_target(bean);
        factory.apply_config(self.properties.to_proxy_config());
        factory.add_advisors(advisors.iter().cloned())?;
        factory.set_pre_filtered(true);

        let proxy = match &self.hint {
            Some(hint) => factory.get_proxy_with_hint(hint)?,
            None => factory.get_proxy()?,
        };
        tracing::info!(
            "🔷 [AOP] Created {:?} proxy for '{}' with {} advisor(s)",
            proxy.kind(),
            bean_name,
            advisors.len()
        );
        Ok(proxy)
    }
}

impl BeanPostProcessor for AopBeanPostProcessor {
    fn name(&self) -> &str {
        "AopBeanPostProcessor"
    }

    fn order(&self) -> i32 {
        // 在其他处理器之后执行，代理包装最终的对象
        2000
    }

    fn post_process_after_initialization(
        &self,
        bean: Arc<dyn Bean>,
        bean_name: &str,
    ) -> ContainerResult<Arc<dyn Bean>> {
        if !self.properties.enabled {
            return Ok(bean);
        }

        self.wrap_if_necessary(bean, bean_name)
            .map_err(|e| ContainerError::PostProcessingFailed {
                bean: bean_name.to_string(),
                source: e.into(),
            })
    }
}
