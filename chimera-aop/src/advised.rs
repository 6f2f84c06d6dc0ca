//! 代理配置（AdvisedSupport）
//!
//! 持有目标源、有序的通知器列表、额外代理的接口以及代理标志。
//! 冻结之前可以修改；产生过代理（激活）之后的结构修改会同步通知监听器。
//!
//! 并发模型：
//! - 通知器列表是写时复制的 `Arc<[Advisor]>` 快照，读者永远看不到半更新的列表
//! - 激活检查与监听器通知在同一把生命周期锁下完成
//! - 方法调用链缓存按配置代数（generation）打标，过期条目不会被使用

use chimera_core::{Bean, BeanClass, ClassKey, Interface, Method};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::advice::Advice;
use crate::advisor::Advisor;
use crate::chain::{build_chain, ChainLink};
use crate::error::{AopError, AopResult};
use crate::target_source::{EmptyTargetSource, SingletonTargetSource, TargetSource};

/// 代理标志
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    /// 强制使用子类代理
    pub proxy_target_class: bool,
    /// 允许激进优化（选择子类代理）
    pub optimize: bool,
    /// 代理不暴露自身的配置
    pub opaque: bool,
    /// 调用期间把代理发布到当前线程
    pub expose_proxy: bool,
    /// 拒绝结构修改
    pub frozen: bool,
}

/// 配置变化监听器
///
/// 回调在配置的生命周期锁内同步执行，回调中不能再修改同一个配置
pub trait AdvisedSupportListener: Send + Sync {
    /// 第一个代理创建时调用
    fn activated(&self, _advised: &AdvisedSupport) {}

    /// 激活之后通知器列表或接口发生变化
    fn advice_changed(&self, advised: &AdvisedSupport);
}

struct AdvisedState {
    target_source: Arc<dyn TargetSource>,
    advisors: Arc<[Advisor]>,
    interfaces: Vec<Arc<Interface>>,
    config: ProxyConfig,
    pre_filtered: bool,
}

#[derive(Default)]
struct Lifecycle {
    listeners: Vec<Arc<dyn AdvisedSupportListener>>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct ChainKey {
    class: ClassKey,
    method: Method,
}

struct CachedChain {
    generation: u64,
    chain: Arc<[ChainLink]>,
}

/// 结构修改的暂存区
///
/// 修改在副本上进行，闭包成功返回后才整体替换
struct Staged {
    advisors: Vec<Advisor>,
    interfaces: Vec<Arc<Interface>>,
}

impl Staged {
    fn add_introduced_interfaces(&mut self, advisor: &Advisor) {
        for iface in advisor.introduced_interfaces() {
            if !self.interfaces.iter().any(|i| i.name() == iface.name()) {
                self.interfaces.push(Arc::clone(iface));
            }
        }
    }

    fn remove_introduced_interfaces(&mut self, advisor: &Advisor) {
        for iface in advisor.introduced_interfaces() {
            let still_introduced = self
                .advisors
                .iter()
                .any(|a| a.introduced_interfaces().iter().any(|i| i.name() == iface.name()));
            if !still_introduced {
                self.interfaces.retain(|i| i.name() != iface.name());
            }
        }
    }

    fn check_index(&self, index: usize, inclusive: bool) -> AopResult<()> {
        let len = self.advisors.len();
        let in_range = if inclusive { index <= len } else { index < len };
        if in_range {
            Ok(())
        } else {
            Err(AopError::InvalidArgument(format!(
                "Advisor index {} is out of bounds: only {} advisor(s) defined",
                index, len
            )))
        }
    }
}

/// 代理配置
pub struct AdvisedSupport {
    state: RwLock<AdvisedState>,
    lifecycle: Mutex<Lifecycle>,
    // 只在持有生命周期锁时写入
    active: AtomicBool,
    chain_cache: DashMap<ChainKey, CachedChain>,
    generation: AtomicU64,
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisedSupport {
    /// 没有目标的空配置
    pub fn new() -> Self {
        Self::with_target_source(Arc::new(EmptyTargetSource::new()))
    }

    /// 以固定单例为目标
    pub fn with_target(target: Arc<dyn Bean>) -> Self {
        Self::with_target_source(Arc::new(SingletonTargetSource::new(target)))
    }

    pub fn with_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        Self {
            state: RwLock::new(AdvisedState {
                target_source,
                advisors: Arc::from(Vec::new()),
                interfaces: Vec::new(),
                config: ProxyConfig::default(),
                pre_filtered: false,
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
            active: AtomicBool::new(false),
            chain_cache: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // 目标源
    // ------------------------------------------------------------------

    pub fn target_source(&self) -> Arc<dyn TargetSource> {
        Arc::clone(&self.state.read().target_source)
    }

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        {
            let mut state = self.state.write();
            state.target_source = target_source;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        self.chain_cache.clear();
    }

    pub fn set_target(&self, target: Arc<dyn Bean>) {
        self.set_target_source(Arc::new(SingletonTargetSource::new(target)));
    }

    pub fn target_class(&self) -> Option<Arc<BeanClass>> {
        self.state.read().target_source.target_class()
    }

    // ------------------------------------------------------------------
    // 通知器
    // ------------------------------------------------------------------

    /// 当前通知器列表的快照
    pub fn advisors(&self) -> Arc<[Advisor]> {
        Arc::clone(&self.state.read().advisors)
    }

    pub fn advisor_count(&self) -> usize {
        self.state.read().advisors.len()
    }

    pub fn index_of(&self, advisor: &Advisor) -> Option<usize> {
        self.state
            .read()
            .advisors
            .iter()
            .position(|a| a.ptr_eq(advisor))
    }

    /// 追加到末尾
    pub fn add_advisor(&self, advisor: Advisor) -> AopResult<()> {
        advisor.validate()?;
        self.mutate("add advisor", |staged| {
            staged.add_introduced_interfaces(&advisor);
            staged.advisors.push(advisor);
            Ok(Some(()))
        })
        .map(|_| ())
    }

    /// 插入到指定位置，`index` 可以等于当前长度
    pub fn add_advisor_at(&self, index: usize, advisor: Advisor) -> AopResult<()> {
        advisor.validate()?;
        self.mutate("add advisor", |staged| {
            staged.check_index(index, true)?;
            staged.add_introduced_interfaces(&advisor);
            staged.advisors.insert(index, advisor);
            Ok(Some(()))
        })
        .map(|_| ())
    }

    /// 批量追加，要么全部成功要么都不生效
    pub fn add_advisors(&self, advisors: impl IntoIterator<Item = Advisor>) -> AopResult<()> {
        let advisors: Vec<Advisor> = advisors.into_iter().collect();
        for advisor in &advisors {
            advisor.validate()?;
        }
        self.mutate("add advisors", |staged| {
            for advisor in advisors {
                staged.add_introduced_interfaces(&advisor);
                staged.advisors.push(advisor);
            }
            Ok(Some(()))
        })
        .map(|_| ())
    }

    /// 从 `index` 开始按顺序插入一批通知器，一次修改完成
    pub fn add_advisors_at(
        &self,
        index: usize,
        advisors: impl IntoIterator<Item = Advisor>,
    ) -> AopResult<()> {
        let advisors: Vec<Advisor> = advisors.into_iter().collect();
        for advisor in &advisors {
            advisor.validate()?;
        }
        self.mutate("add advisors", |staged| {
            staged.check_index(index, true)?;
            for advisor in &advisors {
                staged.add_introduced_interfaces(advisor);
            }
            staged.advisors.splice(index..index, advisors);
            Ok(Some(()))
        })
        .map(|_| ())
    }

    /// 把通知包装成无条件通知器追加到末尾
    pub fn add_advice(&self, advice: Advice) -> AopResult<Advisor> {
        let advisor = Advisor::unconditional(advice);
        self.add_advisor(advisor.clone())?;
        Ok(advisor)
    }

    /// 移除指定通知器，不存在时返回 `false`
    pub fn remove_advisor(&self, advisor: &Advisor) -> AopResult<bool> {
        self.mutate("remove advisor", |staged| {
            let Some(index) = staged.advisors.iter().position(|a| a.ptr_eq(advisor)) else {
                return Ok(None);
            };
            let removed = staged.advisors.remove(index);
            staged.remove_introduced_interfaces(&removed);
            Ok(Some(()))
        })
        .map(|changed| changed.is_some())
    }

    /// 按位置移除，返回被移除的通知器
    pub fn remove_advisor_at(&self, index: usize) -> AopResult<Advisor> {
        self.mutate("remove advisor", |staged| {
            staged.check_index(index, false)?;
            let removed = staged.advisors.remove(index);
            staged.remove_introduced_interfaces(&removed);
            Ok(Some(removed))
        })?
        .ok_or_else(|| AopError::InvalidArgument(format!("No advisor at index {}", index)))
    }

    /// 原子替换：读者要么看到旧列表，要么看到新列表
    pub fn replace_advisor(&self, old: &Advisor, new: Advisor) -> AopResult<bool> {
        new.validate()?;
        self.mutate("replace advisor", |staged| {
            let Some(index) = staged.advisors.iter().position(|a| a.ptr_eq(old)) else {
                return Ok(None);
            };
            let removed = std::mem::replace(&mut staged.advisors[index], new);
            staged.remove_introduced_interfaces(&removed);
            let added = staged.advisors[index].clone();
            staged.add_introduced_interfaces(&added);
            Ok(Some(()))
        })
        .map(|changed| changed.is_some())
    }

    // ------------------------------------------------------------------
    // 接口
    // ------------------------------------------------------------------

    /// 额外代理的接口（包括引入通知器带来的接口）
    pub fn interfaces(&self) -> Vec<Arc<Interface>> {
        self.state.read().interfaces.clone()
    }

    pub fn add_interface(&self, interface: Arc<Interface>) -> AopResult<()> {
        self.mutate("add interface", |staged| {
            if staged.interfaces.iter().any(|i| i.name() == interface.name()) {
                return Ok(None);
            }
            staged.interfaces.push(interface);
            Ok(Some(()))
        })
        .map(|_| ())
    }

    pub fn remove_interface(&self, name: &str) -> AopResult<bool> {
        self.mutate("remove interface", |staged| {
            let before = staged.interfaces.len();
            staged.interfaces.retain(|i| i.name() != name);
            Ok((staged.interfaces.len() != before).then_some(()))
        })
        .map(|changed| changed.is_some())
    }

    pub fn is_interface_proxied(&self, name: &str) -> bool {
        self.state
            .read()
            .interfaces
            .iter()
            .any(|i| i.name() == name)
    }

    // ------------------------------------------------------------------
    // 标志
    // ------------------------------------------------------------------

    /// 标志快照
    pub fn config(&self) -> ProxyConfig {
        self.state.read().config.clone()
    }

    pub fn apply_config(&self, config: ProxyConfig) {
        self.state.write().config = config;
    }

    pub fn set_proxy_target_class(&self, value: bool) {
        self.state.write().config.proxy_target_class = value;
    }

    pub fn is_proxy_target_class(&self) -> bool {
        self.state.read().config.proxy_target_class
    }

    pub fn set_optimize(&self, value: bool) {
        self.state.write().config.optimize = value;
    }

    pub fn set_opaque(&self, value: bool) {
        self.state.write().config.opaque = value;
    }

    pub fn is_opaque(&self) -> bool {
        self.state.read().config.opaque
    }

    pub fn set_expose_proxy(&self, value: bool) {
        self.state.write().config.expose_proxy = value;
    }

    pub fn is_expose_proxy(&self) -> bool {
        self.state.read().config.expose_proxy
    }

    pub fn set_frozen(&self, value: bool) {
        self.state.write().config.frozen = value;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.read().config.frozen
    }

    /// 调用方承诺所有通知器都已匹配目标类型
    pub fn set_pre_filtered(&self, value: bool) {
        let mut state = self.state.write();
        if state.pre_filtered != value {
            state.pre_filtered = value;
            self.generation.fetch_add(1, Ordering::SeqCst);
            drop(state);
            self.chain_cache.clear();
        }
    }

    pub fn is_pre_filtered(&self) -> bool {
        self.state.read().pre_filtered
    }

    // ------------------------------------------------------------------
    // 激活与监听器
    // ------------------------------------------------------------------

    pub fn add_listener(&self, listener: Arc<dyn AdvisedSupportListener>) {
        self.lifecycle.lock().listeners.push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn AdvisedSupportListener>) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        let before = lifecycle.listeners.len();
        lifecycle
            .listeners
            .retain(|l| !std::ptr::addr_eq(Arc::as_ptr(l), Arc::as_ptr(listener)));
        lifecycle.listeners.len() != before
    }

    /// 是否已经产生过代理
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 代理创建时调用，只在第一次时通知监听器
    pub(crate) fn activate(&self) {
        let lifecycle = self.lifecycle.lock();
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        for listener in &lifecycle.listeners {
            listener.activated(self);
        }
    }

    /// 结构修改的统一入口
    ///
    /// 在副本上执行 `f`，失败或返回 `None` 时不做任何改变。
    /// 生命周期锁在整个过程中持有，保证激活检查和通知之间没有空隙。
    fn mutate<R>(
        &self,
        action: &str,
        f: impl FnOnce(&mut Staged) -> AopResult<Option<R>>,
    ) -> AopResult<Option<R>> {
        let lifecycle = self.lifecycle.lock();

        let result = {
            let mut state = self.state.write();
            if state.config.frozen {
                return Err(AopError::frozen(action));
            }

            let mut staged = Staged {
                advisors: state.advisors.to_vec(),
                interfaces: state.interfaces.clone(),
            };
            let Some(result) = f(&mut staged)? else {
                return Ok(None);
            };

            state.advisors = Arc::from(staged.advisors);
            state.interfaces = staged.interfaces;
            self.generation.fetch_add(1, Ordering::SeqCst);
            result
        };
        self.chain_cache.clear();

        if self.active.load(Ordering::SeqCst) {
            tracing::debug!(
                action,
                listeners = lifecycle.listeners.len(),
                "Advised configuration changed after activation"
            );
            for listener in &lifecycle.listeners {
                listener.advice_changed(self);
            }
        }
        Ok(Some(result))
    }

    // ------------------------------------------------------------------
    // 调用链
    // ------------------------------------------------------------------

    /// 某个方法的拦截器链（带缓存）
    pub fn interceptors_for(
        &self,
        method: &Method,
        target_class: &BeanClass,
    ) -> AopResult<Arc<[ChainLink]>> {
        let key = ChainKey {
            class: target_class.key(),
            method: method.clone(),
        };

        let (advisors, pre_filtered, generation) = {
            let state = self.state.read();
            (
                Arc::clone(&state.advisors),
                state.pre_filtered,
                self.generation.load(Ordering::SeqCst),
            )
        };

        if let Some(cached) = self.chain_cache.get(&key) {
            if cached.generation == generation {
                return Ok(Arc::clone(&cached.chain));
            }
        }

        let chain: Arc<[ChainLink]> =
            Arc::from(build_chain(&advisors, method, target_class, pre_filtered)?);
        self.chain_cache.insert(
            key,
            CachedChain {
                generation,
                chain: Arc::clone(&chain),
            },
        );
        Ok(chain)
    }

    /// 调用链缓存中的条目数
    pub fn cached_chain_count(&self) -> usize {
        self.chain_cache.len()
    }

    /// 用于诊断的 JSON 描述
    pub fn to_config_string(&self) -> String {
        #[derive(Serialize)]
        struct Summary {
            target_source: String,
            advisors: Vec<String>,
            interfaces: Vec<String>,
            pre_filtered: bool,
            active: bool,
            #[serde(flatten)]
            config: ProxyConfig,
        }

        let active = self.is_active();
        let state = self.state.read();
        let summary = Summary {
            target_source: state.target_source.describe(),
            advisors: state.advisors.iter().map(|a| a.name().to_string()).collect(),
            interfaces: state
                .interfaces
                .iter()
                .map(|i| i.name().to_string())
                .collect(),
            pre_filtered: state.pre_filtered,
            active,
            config: state.config.clone(),
        };
        serde_json::to_string(&summary)
            .unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("AdvisedSupport")
            .field("advisors", &state.advisors.len())
            .field("interfaces", &state.interfaces.len())
            .field("config", &state.config)
            .field("pre_filtered", &state.pre_filtered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::DelegatingIntroductionInterceptor;
    use crate::pointcut::Pointcut;
    use chimera_core::{unit, Value};
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn noop() -> Advisor {
        Advisor::unconditional(Advice::around(|_| Ok(unit())))
    }

    #[derive(Default)]
    struct Recorder {
        activated: AtomicUsize,
        changed: AtomicUsize,
    }

    impl AdvisedSupportListener for Recorder {
        fn activated(&self, _advised: &AdvisedSupport) {
            self.activated.fetch_add(1, Ordering::SeqCst);
        }

        fn advice_changed(&self, _advised: &AdvisedSupport) {
            self.changed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_insert_remove_replace() {
        let advised = AdvisedSupport::new();
        let (a, b, c, d) = (noop(), noop(), noop(), noop());

        advised.add_advisor(a.clone()).unwrap();
        advised.add_advisor(c.clone()).unwrap();
        advised.add_advisor_at(1, b.clone()).unwrap();
        assert_eq!(advised.index_of(&b), Some(1));
        assert_eq!(advised.index_of(&c), Some(2));

        assert!(advised.replace_advisor(&b, d.clone()).unwrap());
        assert_eq!(advised.index_of(&b), None);
        assert_eq!(advised.index_of(&d), Some(1));

        assert!(advised.remove_advisor(&a).unwrap());
        assert!(!advised.remove_advisor(&a).unwrap());
        let removed = advised.remove_advisor_at(0).unwrap();
        assert_eq!(removed, d);
        assert_eq!(&*advised.advisors(), &[c]);
    }

    #[test]
    fn test_batch_insert_is_one_change() {
        let advised = AdvisedSupport::new();
        let existing = noop();
        advised.add_advisor(existing.clone()).unwrap();
        let recorder = Arc::new(Recorder::default());
        advised.add_listener(recorder.clone());
        advised.activate();

        let (a, b) = (noop(), noop());
        advised.add_advisors_at(0, [a.clone(), b.clone()]).unwrap();
        assert_eq!(&*advised.advisors(), &[a, b, existing]);
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 1);

        let before = advised.advisors();
        assert!(matches!(
            advised.add_advisors_at(5, [noop(), noop()]),
            Err(AopError::InvalidArgument(_))
        ));
        assert!(Arc::ptr_eq(&before, &advised.advisors()));
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_out_of_range_index_is_invalid_argument() {
        let advised = AdvisedSupport::new();
        assert!(matches!(
            advised.add_advisor_at(1, noop()),
            Err(AopError::InvalidArgument(_))
        ));
        assert!(matches!(
            advised.remove_advisor_at(0),
            Err(AopError::InvalidArgument(_))
        ));
        assert_eq!(advised.advisor_count(), 0);
    }

    #[test]
    fn test_frozen_rejects_mutation_without_change() {
        let advised = AdvisedSupport::new();
        let existing = noop();
        advised.add_advisor(existing.clone()).unwrap();
        advised.set_frozen(true);

        let before = advised.advisors();
        assert!(matches!(
            advised.add_advisor(noop()),
            Err(AopError::Configuration(_))
        ));
        assert!(matches!(
            advised.remove_advisor(&existing),
            Err(AopError::Configuration(_))
        ));
        assert!(matches!(
            advised.replace_advisor(&existing, noop()),
            Err(AopError::Configuration(_))
        ));
        let after = advised.advisors();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_listeners_notified_only_after_activation_in_order() {
        let advised = AdvisedSupport::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Named(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl AdvisedSupportListener for Named {
            fn advice_changed(&self, _advised: &AdvisedSupport) {
                self.1.lock().push(self.0);
            }
        }

        let recorder = Arc::new(Recorder::default());
        advised.add_listener(recorder.clone());
        advised.add_listener(Arc::new(Named("first", Arc::clone(&order))));
        advised.add_listener(Arc::new(Named("second", Arc::clone(&order))));

        advised.add_advisor(noop()).unwrap();
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 0);

        advised.activate();
        advised.activate();
        assert_eq!(recorder.activated.load(Ordering::SeqCst), 1);

        advised.add_advisor(noop()).unwrap();
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 1);
        assert_eq!(*order.lock(), vec!["first", "second"]);

        let listener: Arc<dyn AdvisedSupportListener> = recorder.clone();
        assert!(advised.remove_listener(&listener));
        advised.add_advisor(noop()).unwrap();
        assert_eq!(recorder.changed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_chain_cache_invalidated_by_mutation() {
        let class = BeanClass::builder("Svc").method("run").build();
        let run = class.find_method("run").unwrap();
        let advised = AdvisedSupport::new();
        advised.add_advisor(noop()).unwrap();

        let first = advised.interceptors_for(&run, &class).unwrap();
        let again = advised.interceptors_for(&run, &class).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(advised.cached_chain_count(), 1);

        advised
            .add_advisor(Advisor::new(
                Advice::around(|inv| inv.proceed()),
                Pointcut::method_names(["run"]),
            ))
            .unwrap();
        assert_eq!(advised.cached_chain_count(), 0);
        assert_eq!(advised.interceptors_for(&run, &class).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_list() {
        let advised = Arc::new(AdvisedSupport::new());
        let base = noop();
        advised.add_advisor(base.clone()).unwrap();

        let writer = {
            let advised = Arc::clone(&advised);
            thread::spawn(move || {
                let mut current = base;
                for _ in 0..200 {
                    let next = noop();
                    assert!(advised.replace_advisor(&current, next.clone()).unwrap());
                    current = next;
                }
            })
        };

        for _ in 0..200 {
            assert_eq!(advised.advisors().len(), 1);
        }
        writer.join().unwrap();
        assert_eq!(advised.advisor_count(), 1);
    }

    #[test]
    fn test_introduction_adds_and_removes_interface() {
        struct Auditable;
        impl Bean for Auditable {
            fn bean_class(&self) -> Arc<BeanClass> {
                BeanClass::builder("AuditableImpl")
                    .implements(Interface::new("Auditable").method("audit_log").build())
                    .build()
            }
            fn invoke(&self, _: &Method, _: &[Value]) -> anyhow::Result<Value> {
                Ok(unit())
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
        }

        let advised = AdvisedSupport::new();
        let delegate: Arc<dyn Bean> = Arc::new(Auditable);
        let interfaces = delegate.bean_class().all_interfaces();
        let advisor = Advisor::introduction(
            Arc::new(DelegatingIntroductionInterceptor::new(delegate)),
            interfaces,
        );

        advised.add_advisor(advisor.clone()).unwrap();
        assert!(advised.is_interface_proxied("Auditable"));

        advised.remove_advisor(&advisor).unwrap();
        assert!(!advised.is_interface_proxied("Auditable"));
    }

    #[test]
    fn test_to_config_string_is_json() {
        let advised = AdvisedSupport::new();
        advised.add_advisor(noop().named("audit")).unwrap();
        advised.set_expose_proxy(true);

        let json: serde_json::Value = serde_json::from_str(&advised.to_config_string()).unwrap();
        assert_eq!(json["advisors"][0], "audit");
        assert_eq!(json["expose-proxy"], true);
        assert_eq!(json["pre_filtered"], false);
    }
}
