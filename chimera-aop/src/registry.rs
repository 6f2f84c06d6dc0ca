//! 通知器注册表
//!
//! 自动代理创建器从这里按名称发现候选通知器。
//! 通知器可以直接注册实例，也可以注册一个工厂，在第一次查询时创建。

use chimera_core::{ContainerError, CreationTracker};
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::advisor::Advisor;
use crate::aspect::{aspect_advisor, get_all_aspect_registrations, Aspect};
use crate::error::{AopError, AopResult};

/// 通知器来源
pub trait AdvisorRegistry: Send + Sync {
    /// 全部通知器名称，按注册顺序
    fn advisor_names(&self) -> Vec<String>;

    /// 名称对应的通知器是否正由当前线程创建（循环依赖）
    fn is_currently_in_creation(&self, name: &str) -> bool;

    fn get_advisor(&self, name: &str) -> AopResult<Advisor>;
}

type AdvisorCreator = Box<dyn Fn() -> anyhow::Result<Advisor> + Send + Sync>;

enum AdvisorEntry {
    Instance(Advisor),
    Factory {
        create: AdvisorCreator,
        instance: OnceCell<Advisor>,
    },
}

/// 全局通知器注册表
///
/// 第一次访问时加载所有通过 inventory 注册的切面
static GLOBAL_ADVISOR_REGISTRY: Lazy<Arc<DefaultAdvisorRegistry>> = Lazy::new(|| {
    let registry = DefaultAdvisorRegistry::new();
    registry.auto_load_aspects();
    Arc::new(registry)
});

/// 获取全局通知器注册表
pub fn global_registry() -> &'static Arc<DefaultAdvisorRegistry> {
    &GLOBAL_ADVISOR_REGISTRY
}

/// 默认的通知器注册表
///
/// 工厂注册的通知器只会创建一次。创建线程在创建期间的同名查询返回
/// [`ContainerError::BeanCurrentlyInCreation`]，而不是递归进入工厂；
/// 其他线程的查询等待创建完成。
#[derive(Default)]
pub struct DefaultAdvisorRegistry {
    entries: RwLock<Vec<(String, Arc<AdvisorEntry>)>>,
    creation: CreationTracker,
}

impl DefaultAdvisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, name: String, entry: AdvisorEntry) -> AopResult<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|(existing, _)| *existing == name) {
            return Err(ContainerError::BeanAlreadyExists(name).into());
        }
        tracing::debug!("Registering advisor: {}", name);
        entries.push((name, Arc::new(entry)));
        Ok(())
    }

    /// 注册通知器实例
    pub fn register(&self, name: impl Into<String>, advisor: Advisor) -> AopResult<()> {
        self.insert(name.into(), AdvisorEntry::Instance(advisor))
    }

    /// 注册延迟创建的通知器
    pub fn register_factory<F>(&self, name: impl Into<String>, create: F) -> AopResult<()>
    where
        F: Fn() -> anyhow::Result<Advisor> + Send + Sync + 'static,
    {
        self.insert(
            name.into(),
            AdvisorEntry::Factory {
                create: Box::new(create),
                instance: OnceCell::new(),
            },
        )
    }

    /// 以切面名称注册切面
    pub fn register_aspect(&self, aspect: Arc<dyn Aspect>) -> AopResult<()> {
        let name = aspect.name().to_string();
        self.register(name, aspect_advisor(aspect))
    }

    /// 从 inventory 加载所有注册的切面，返回新加载的数量
    ///
    /// 同名的切面只保留第一个
    pub fn auto_load_aspects(&self) -> usize {
        let registrations: Vec<_> = get_all_aspect_registrations().collect();
        tracing::info!("Auto-loading {} aspect(s) from registry", registrations.len());

        let mut loaded = 0;
        for registration in registrations {
            tracing::debug!("  ├─ Loading aspect: {}", registration.name);
            let creator = registration.creator;
            match self.register_factory(registration.name, move || Ok(aspect_advisor(creator()))) {
                Ok(()) => loaded += 1,
                Err(e) => tracing::warn!(error = %e, "Skipping aspect registration"),
            }
        }

        tracing::info!("Auto-loaded {} aspect(s)", loaded);
        loaded
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().iter().any(|(existing, _)| existing == name)
    }

    /// 注册表使用的创建跟踪器
    pub fn creation_tracker(&self) -> &CreationTracker {
        &self.creation
    }

    fn entry(&self, name: &str) -> Option<Arc<AdvisorEntry>> {
        self.entries
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, entry)| Arc::clone(entry))
    }
}

impl AdvisorRegistry for DefaultAdvisorRegistry {
    fn advisor_names(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.creation.is_creating_in_current_thread(name)
    }

    fn get_advisor(&self, name: &str) -> AopResult<Advisor> {
        let entry = self
            .entry(name)
            .ok_or_else(|| ContainerError::BeanNotFound(name.to_string()))?;

        match entry.as_ref() {
            AdvisorEntry::Instance(advisor) => Ok(advisor.clone()),
            AdvisorEntry::Factory { create, instance } => {
                if let Some(advisor) = instance.get() {
                    return Ok(advisor.clone());
                }
                if self.creation.is_creating_in_current_thread(name) {
                    return Err(ContainerError::BeanCurrentlyInCreation(name.to_string()).into());
                }

                // 其他线程正在创建时在这里等待同一个实例
                let advisor = instance.get_or_try_init(|| {
                    let _guard = self.creation.guard(name).ok_or_else(|| {
                        AopError::from(ContainerError::BeanCurrentlyInCreation(name.to_string()))
                    })?;
                    tracing::debug!("Creating advisor: {}", name);
                    create().map_err(|e| {
                        AopError::from(ContainerError::BeanCreationFailed(format!(
                            "advisor '{}': {:#}",
                            name, e
                        )))
                    })
                })?;
                Ok(advisor.clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Advice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop() -> Advisor {
        Advisor::unconditional(Advice::around(|inv| inv.proceed()))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DefaultAdvisorRegistry::new();
        let advisor = noop();
        registry.register("audit", advisor.clone()).unwrap();

        assert_eq!(registry.advisor_names(), vec!["audit".to_string()]);
        assert_eq!(registry.get_advisor("audit").unwrap(), advisor);
        assert!(matches!(
            registry.register("audit", noop()),
            Err(AopError::Container(ContainerError::BeanAlreadyExists(_)))
        ));
        assert!(matches!(
            registry.get_advisor("missing"),
            Err(AopError::Container(ContainerError::BeanNotFound(_)))
        ));
    }

    #[test]
    fn test_factory_creates_once() {
        let registry = DefaultAdvisorRegistry::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        registry
            .register_factory("lazy", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(noop())
            })
            .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 0);
        let first = registry.get_advisor("lazy").unwrap();
        let second = registry.get_advisor("lazy").unwrap();
        assert_eq!(first, second);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(!registry.is_currently_in_creation("lazy"));
    }

    #[test]
    fn test_reentrant_lookup_reports_in_creation() {
        let registry = Arc::new(DefaultAdvisorRegistry::new());
        let seen = Arc::new(parking_lot::Mutex::new(None));

        let inner = Arc::downgrade(&registry);
        let observed = Arc::clone(&seen);
        registry
            .register_factory("cyclic", move || {
                if let Some(registry) = inner.upgrade() {
                    *observed.lock() = Some((
                        registry.is_currently_in_creation("cyclic"),
                        registry.get_advisor("cyclic").is_err(),
                    ));
                }
                Ok(noop())
            })
            .unwrap();

        assert!(registry.get_advisor("cyclic").is_ok());
        assert_eq!(*seen.lock(), Some((true, true)));
    }

    #[test]
    fn test_concurrent_lookup_waits_for_creation() {
        let registry = Arc::new(DefaultAdvisorRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let started_tx = parking_lot::Mutex::new(started_tx);
        let counter = Arc::clone(&created);
        registry
            .register_factory("slowTracing", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.lock().send(());
                std::thread::sleep(std::time::Duration::from_millis(100));
                Ok(noop())
            })
            .unwrap();

        let creator = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || registry.get_advisor("slowTracing").unwrap())
        };
        started_rx.recv().unwrap();

        assert!(!registry.is_currently_in_creation("slowTracing"));
        let waited = registry.get_advisor("slowTracing").unwrap();
        assert_eq!(waited, creator.join().unwrap());
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_failure_is_reported() {
        let registry = DefaultAdvisorRegistry::new();
        registry
            .register_factory("broken", || anyhow::bail!("missing dependency"))
            .unwrap();

        let err = registry.get_advisor("broken").err().unwrap();
        assert!(err.to_string().contains("missing dependency"));
        assert!(!registry.is_currently_in_creation("broken"));
    }
}
