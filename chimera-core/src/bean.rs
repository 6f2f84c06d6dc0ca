//! Bean 对象模型
//!
//! 代理层不做字节码生成，而是基于显式的运行时类型元数据工作：
//! - [`BeanClass`] 描述一个类型（名称、接口、方法、父类、是否可继承）
//! - [`Method`] 描述一个操作签名
//! - [`Bean`] 是动态分派入口，目标对象和代理对象都实现它

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::ContainerError;

/// 方法参数与返回值的统一载体
pub type Value = Arc<dyn Any + Send + Sync>;

/// 把任意值包装成 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 无返回值方法使用的返回值
pub fn unit() -> Value {
    Arc::new(())
}

/// 尝试把 [`Value`] 转换为具体类型
pub fn downcast_value<T: Any + Send + Sync>(v: &Value) -> Option<&T> {
    v.downcast_ref::<T>()
}

type Name = Cow<'static, str>;

/// 方法签名
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Method {
    declaring_type: Name,
    name: Name,
    parameter_types: Vec<Name>,
    is_final: bool,
}

impl Method {
    pub fn new(declaring_type: impl Into<Name>, name: impl Into<Name>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            parameter_types: Vec::new(),
            is_final: false,
        }
    }

    /// 设置参数类型列表
    pub fn with_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        self.parameter_types = params.into_iter().map(Into::into).collect();
        self
    }

    /// 标记为 final 方法（子类代理无法覆盖）
    pub fn final_method(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 声明此方法的类型或接口名称
    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn parameter_types(&self) -> Vec<&str> {
        self.parameter_types.iter().map(|p| p.as_ref()).collect()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// 名称与参数类型都相同（忽略声明类型）
    pub fn same_signature(&self, other: &Method) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }

    /// 完整签名，例如 `UserService::save(String, u32)`
    pub fn signature(&self) -> String {
        format!(
            "{}::{}({})",
            self.declaring_type,
            self.name,
            self.parameter_types.join(", ")
        )
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Method({})", self.signature())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 能力接口
#[derive(Debug)]
pub struct Interface {
    name: Name,
    methods: Vec<Method>,
}

impl Interface {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// 声明一个接口方法
    pub fn method(mut self, name: impl Into<Name>) -> Self {
        let method = Method::new(self.name.clone(), name);
        self.methods.push(method);
        self
    }

    /// 声明一个带参数的接口方法
    pub fn method_with_params<I, S>(mut self, name: impl Into<Name>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        let method = Method::new(self.name.clone(), name).with_params(params);
        self.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<Interface> {
        Arc::new(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name() == name)
    }
}

/// 构造函数回调
pub type Constructor = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// 子类代理创建实例的方式
#[derive(Clone, Default)]
pub enum Instantiation {
    /// 绕过构造逻辑直接合成实例
    #[default]
    Synthesized,
    /// 必须运行类型自身的构造函数
    Constructor(Constructor),
    /// 没有可访问的实例化途径
    Inaccessible,
}

impl fmt::Debug for Instantiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instantiation::Synthesized => write!(f, "Synthesized"),
            Instantiation::Constructor(_) => write!(f, "Constructor(..)"),
            Instantiation::Inaccessible => write!(f, "Inaccessible"),
        }
    }
}

/// 类型的稳定身份标识
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassKey {
    name: String,
    type_id: Option<TypeId>,
}

impl ClassKey {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// 运行时类型元数据
pub struct BeanClass {
    name: String,
    type_id: Option<TypeId>,
    interfaces: Vec<Arc<Interface>>,
    methods: Vec<Method>,
    super_class: Option<Arc<BeanClass>>,
    is_final: bool,
    instantiation: Instantiation,
    infrastructure: bool,
    generated: bool,
}

impl BeanClass {
    pub fn builder(name: impl Into<String>) -> BeanClassBuilder {
        BeanClassBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> ClassKey {
        ClassKey {
            name: self.name.clone(),
            type_id: self.type_id,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// 直接声明实现的接口
    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    /// 包括父类在内实现的全部接口（按名称去重）
    pub fn all_interfaces(&self) -> Vec<Arc<Interface>> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for iface in &class.interfaces {
                if seen.insert(iface.name().to_string()) {
                    result.push(Arc::clone(iface));
                }
            }
            current = class.super_class.as_deref();
        }
        result
    }

    pub fn declared_methods(&self) -> &[Method] {
        &self.methods
    }

    /// 全部可调用方法：自身、父类、接口，按签名去重，子类优先
    pub fn all_methods(&self) -> Vec<Method> {
        let mut result: Vec<Method> = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            for method in &class.methods {
                if !result.iter().any(|m| m.same_signature(method)) {
                    result.push(method.clone());
                }
            }
            current = class.super_class.as_deref();
        }
        for iface in self.all_interfaces() {
            for method in iface.methods() {
                if !result.iter().any(|m| m.same_signature(method)) {
                    result.push(method.clone());
                }
            }
        }
        result
    }

    /// 按名称查找方法（接口方法优先，保证接口代理与目标看到相同的声明类型）
    pub fn find_method(&self, name: &str) -> Option<Method> {
        for iface in self.all_interfaces() {
            if let Some(m) = iface.find_method(name) {
                return Some(m.clone());
            }
        }
        self.all_methods().into_iter().find(|m| m.name() == name)
    }

    pub fn super_class(&self) -> Option<&Arc<BeanClass>> {
        self.super_class.as_ref()
    }

    pub fn is_final(&self) -> bool {
        self.is_final
    }

    pub fn instantiation(&self) -> &Instantiation {
        &self.instantiation
    }

    /// 基础设施类型不参与自动代理
    pub fn is_infrastructure(&self) -> bool {
        self.infrastructure
    }

    /// 是否为代理生成的类型
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// 跳过生成的代理子类，返回用户定义的类型
    pub fn user_class(self: &Arc<Self>) -> Arc<BeanClass> {
        let mut current = Arc::clone(self);
        while current.generated {
            match &current.super_class {
                Some(parent) => current = Arc::clone(parent),
                None => break,
            }
        }
        current
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.all_interfaces().iter().any(|i| i.name() == interface)
    }

    /// 自身、父类链以及全部接口的名称
    pub fn type_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            names.push(class.name.clone());
            current = class.super_class.as_deref();
        }
        names.extend(self.all_interfaces().iter().map(|i| i.name().to_string()));
        names
    }

    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.type_names().iter().any(|n| n == type_name)
    }
}

impl fmt::Debug for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanClass")
            .field("name", &self.name)
            .field(
                "interfaces",
                &self.interfaces.iter().map(|i| i.name()).collect::<Vec<_>>(),
            )
            .field("methods", &self.methods.len())
            .field("super_class", &self.super_class.as_ref().map(|s| s.name()))
            .field("is_final", &self.is_final)
            .field("generated", &self.generated)
            .finish()
    }
}

impl fmt::Display for BeanClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// [`BeanClass`] 构建器
pub struct BeanClassBuilder {
    class: BeanClass,
}

impl BeanClassBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            class: BeanClass {
                name: name.into(),
                type_id: None,
                interfaces: Vec::new(),
                methods: Vec::new(),
                super_class: None,
                is_final: false,
                instantiation: Instantiation::default(),
                infrastructure: false,
                generated: false,
            },
        }
    }

    /// 绑定 Rust 类型身份
    pub fn of<T: Any>(mut self) -> Self {
        self.class.type_id = Some(TypeId::of::<T>());
        self
    }

    pub fn implements(mut self, interface: Arc<Interface>) -> Self {
        self.class.interfaces.push(interface);
        self
    }

    pub fn implements_all(mut self, interfaces: impl IntoIterator<Item = Arc<Interface>>) -> Self {
        self.class.interfaces.extend(interfaces);
        self
    }

    /// 声明一个类方法（声明类型为当前类）
    pub fn method(mut self, name: impl Into<Name>) -> Self {
        let method = Method::new(self.class.name.clone(), name);
        self.class.methods.push(method);
        self
    }

    pub fn method_with_params<I, S>(mut self, name: impl Into<Name>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Name>,
    {
        let method = Method::new(self.class.name.clone(), name).with_params(params);
        self.class.methods.push(method);
        self
    }

    pub fn final_method(mut self, name: impl Into<Name>) -> Self {
        let method = Method::new(self.class.name.clone(), name).final_method();
        self.class.methods.push(method);
        self
    }

    /// 直接加入已构造好的方法
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.class.methods.extend(methods);
        self
    }

    pub fn extends(mut self, parent: Arc<BeanClass>) -> Self {
        self.class.super_class = Some(parent);
        self
    }

    pub fn final_class(mut self) -> Self {
        self.class.is_final = true;
        self
    }

    pub fn instantiation(mut self, instantiation: Instantiation) -> Self {
        self.class.instantiation = instantiation;
        self
    }

    /// 子类代理创建时必须运行的构造函数
    pub fn constructor<F>(self, ctor: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.instantiation(Instantiation::Constructor(Arc::new(ctor)))
    }

    pub fn infrastructure(mut self) -> Self {
        self.class.infrastructure = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.class.generated = true;
        self
    }

    pub fn build(self) -> Arc<BeanClass> {
        Arc::new(self.class)
    }
}

/// Bean trait - 可以被代理层动态分派的对象
///
/// 实现方负责根据 [`Method`] 把调用路由到真实的 Rust 方法，
/// 这就是代理最终落到目标对象上的那一跳。
pub trait Bean: Any + Send + Sync {
    /// 运行时类型
    fn bean_class(&self) -> Arc<BeanClass>;

    /// 调用指定方法
    fn invoke(&self, method: &Method, args: &[Value]) -> anyhow::Result<Value>;

    /// 转换为 Any 引用，用于类型转换
    fn as_any(&self) -> &dyn Any;

    /// 按方法名调用
    fn call(&self, method_name: &str, args: &[Value]) -> anyhow::Result<Value> {
        let class = self.bean_class();
        let method = class
            .find_method(method_name)
            .ok_or_else(|| no_such_method(class.name(), method_name))?;
        self.invoke(&method, args)
    }
}

/// 方法不存在时的标准错误
pub fn no_such_method(class: &str, method: &str) -> anyhow::Error {
    ContainerError::NoSuchMethod {
        class: class.to_string(),
        method: method.to_string(),
    }
    .into()
}

/// 两个引用是否指向同一个对象
pub fn same_bean(a: &Arc<dyn Bean>, b: &Arc<dyn Bean>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}
