//! 目标源（TargetSource）
//!
//! 代理每次调用时通过目标源获取真实的接收对象，调用结束后归还。
//! 非静态目标源上每一次成功的 `get_target` 都会配对恰好一次 `release_target`。

use chimera_core::{Bean, BeanClass};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::error::{AopError, AopResult};

/// 目标源
pub trait TargetSource: Send + Sync {
    /// 目标类型，未知时返回 `None`
    fn target_class(&self) -> Option<Arc<BeanClass>>;

    /// `get_target` 是否总是返回同一个实例
    ///
    /// 静态目标源的调用方可以跳过归还步骤
    fn is_static(&self) -> bool;

    /// 获取目标对象；只承载引入能力的代理没有目标，返回 `None`
    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>>;

    /// 归还目标对象
    fn release_target(&self, target: Arc<dyn Bean>) -> AopResult<()>;

    /// 用于日志的描述
    fn describe(&self) -> String {
        match self.target_class() {
            Some(class) => format!("{}[{}]", std::any::type_name::<Self>(), class.name()),
            None => std::any::type_name::<Self>().to_string(),
        }
    }
}

/// 对象工厂
///
/// 负责目标对象的创建和销毁，通常由容器提供
pub trait ObjectFactory: Send + Sync {
    /// 创建出的对象类型
    fn object_class(&self) -> Arc<BeanClass>;

    fn create(&self) -> anyhow::Result<Arc<dyn Bean>>;

    /// 销毁对象（默认什么也不做）
    fn destroy(&self, _instance: Arc<dyn Bean>) -> anyhow::Result<()> {
        Ok(())
    }
}

type CreateFn = Box<dyn Fn() -> anyhow::Result<Arc<dyn Bean>> + Send + Sync>;
type DestroyFn = Box<dyn Fn(Arc<dyn Bean>) -> anyhow::Result<()> + Send + Sync>;

/// 闭包形式的对象工厂
pub struct FunctionFactory {
    class: Arc<BeanClass>,
    create: CreateFn,
    destroy: Option<DestroyFn>,
}

impl FunctionFactory {
    pub fn new<F>(class: Arc<BeanClass>, create: F) -> Self
    where
        F: Fn() -> anyhow::Result<Arc<dyn Bean>> + Send + Sync + 'static,
    {
        Self {
            class,
            create: Box::new(create),
            destroy: None,
        }
    }

    pub fn with_destroy<F>(mut self, destroy: F) -> Self
    where
        F: Fn(Arc<dyn Bean>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.destroy = Some(Box::new(destroy));
        self
    }
}

impl ObjectFactory for FunctionFactory {
    fn object_class(&self) -> Arc<BeanClass> {
        Arc::clone(&self.class)
    }

    fn create(&self) -> anyhow::Result<Arc<dyn Bean>> {
        (self.create)()
    }

    fn destroy(&self, instance: Arc<dyn Bean>) -> anyhow::Result<()> {
        match &self.destroy {
            Some(destroy) => destroy(instance),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FunctionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionFactory")
            .field("class", &self.class.name())
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

/// 固定单例
pub struct SingletonTargetSource {
    target: Arc<dyn Bean>,
}

impl SingletonTargetSource {
    pub fn new(target: Arc<dyn Bean>) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Arc<dyn Bean> {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(self.target.bean_class())
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        Ok(Some(Arc::clone(&self.target)))
    }

    fn release_target(&self, _target: Arc<dyn Bean>) -> AopResult<()> {
        Ok(())
    }
}

/// 没有目标对象
///
/// 用于纯引入代理：所有调用都应该由引入拦截器处理
#[derive(Default)]
pub struct EmptyTargetSource {
    target_class: Option<Arc<BeanClass>>,
}

impl EmptyTargetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 声明一个目标类型（不提供实例）
    pub fn for_class(class: Arc<BeanClass>) -> Self {
        Self {
            target_class: Some(class),
        }
    }
}

impl TargetSource for EmptyTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        self.target_class.clone()
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        Ok(None)
    }

    fn release_target(&self, _target: Arc<dyn Bean>) -> AopResult<()> {
        Ok(())
    }
}

/// 延迟初始化的单例
///
/// 第一次 `get_target` 时创建，并发首次访问也只创建一次
pub struct LazyInitTargetSource {
    factory: Arc<dyn ObjectFactory>,
    instance: OnceCell<Arc<dyn Bean>>,
}

impl LazyInitTargetSource {
    pub fn new(factory: Arc<dyn ObjectFactory>) -> Self {
        Self {
            factory,
            instance: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.instance.get().is_some()
    }
}

impl TargetSource for LazyInitTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(self.factory.object_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        let instance = self.instance.get_or_try_init(|| {
            let class = self.factory.object_class();
            tracing::debug!(class = class.name(), "Lazily creating target");
            self.factory.create().map_err(AopError::TargetCreation)
        })?;
        Ok(Some(Arc::clone(instance)))
    }

    fn release_target(&self, _target: Arc<dyn Bean>) -> AopResult<()> {
        Ok(())
    }
}

/// 原型：每次调用创建新实例，调用结束后销毁
pub struct PrototypeTargetSource {
    factory: Arc<dyn ObjectFactory>,
}

impl PrototypeTargetSource {
    pub fn new(factory: Arc<dyn ObjectFactory>) -> Self {
        Self { factory }
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(self.factory.object_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        let instance = self.factory.create().map_err(AopError::TargetCreation)?;
        Ok(Some(instance))
    }

    fn release_target(&self, target: Arc<dyn Bean>) -> AopResult<()> {
        self.factory.destroy(target).map_err(AopError::TargetRelease)
    }
}

/// 可热替换的目标
///
/// 代理存活期间可以原子地换掉背后的目标对象，正在进行的调用继续使用旧目标
pub struct HotSwappableTargetSource {
    target: RwLock<Arc<dyn Bean>>,
    declared_class: Arc<BeanClass>,
}

impl HotSwappableTargetSource {
    pub fn new(initial: Arc<dyn Bean>) -> Self {
        let declared_class = initial.bean_class();
        Self {
            target: RwLock::new(initial),
            declared_class,
        }
    }

    /// 替换目标，返回旧目标
    ///
    /// 新目标必须可以赋值给初始目标的类型
    pub fn swap(&self, new_target: Arc<dyn Bean>) -> AopResult<Arc<dyn Bean>> {
        let new_class = new_target.bean_class();
        if !new_class.is_assignable_to(self.declared_class.name()) {
            return Err(AopError::InvalidArgument(format!(
                "Cannot swap in target of type '{}': not assignable to '{}'",
                new_class.name(),
                self.declared_class.name()
            )));
        }

        let old = std::mem::replace(&mut *self.target.write(), new_target);
        let old_class = old.bean_class();
        tracing::debug!(
            from = old_class.name(),
            to = new_class.name(),
            "Swapped target"
        );
        Ok(old)
    }

    pub fn current(&self) -> Arc<dyn Bean> {
        Arc::clone(&self.target.read())
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(Arc::clone(&self.declared_class))
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        Ok(Some(self.current()))
    }

    fn release_target(&self, _target: Arc<dyn Bean>) -> AopResult<()> {
        Ok(())
    }
}
