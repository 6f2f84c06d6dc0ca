//! 集成测试共用的夹具

#![allow(dead_code)]

use chimera_aop::{Advice, Advisor, AopResult, TargetSource};
use chimera_core::{
    downcast_value, no_such_method, value, Bean, BeanClass, Interface, LogLevel, LoggingConfig,
    Method, Value,
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 安装测试日志，默认只输出警告；`RUST_LOG` 可以覆盖
///
/// 同一个测试进程里只有第一次调用生效
pub fn init_test_logging() {
    let _ = LoggingConfig::from_env()
        .level(LogLevel::Warn)
        .aop_level(LogLevel::Debug)
        .init();
}

/// 按顺序记录通知和目标调用
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub fn calculator_interface() -> Arc<Interface> {
    Interface::new("Calculator")
        .method_with_params("add", ["i64", "i64"])
        .method("fail")
        .build()
}

pub fn calculator_class() -> Arc<BeanClass> {
    BeanClass::builder("CalculatorService")
        .implements(calculator_interface())
        .method_with_params("add", ["i64", "i64"])
        .method("fail")
        .method("reset")
        .build()
}

/// 简单的计算服务，记录被调用的次数
pub struct CalculatorService {
    journal: Journal,
    pub calls: AtomicUsize,
}

impl CalculatorService {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Bean for CalculatorService {
    fn bean_class(&self) -> Arc<BeanClass> {
        calculator_class()
    }

    fn invoke(&self, method: &Method, args: &[Value]) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push(format!("target:{}", method.name()));
        match method.name() {
            "add" => {
                let a = args.first().and_then(downcast_value::<i64>).copied().unwrap_or(0);
                let b = args.get(1).and_then(downcast_value::<i64>).copied().unwrap_or(0);
                Ok(value(a + b))
            }
            "fail" => anyhow::bail!("calculation failed"),
            "reset" => Ok(value(())),
            other => Err(no_such_method("CalculatorService", other)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 环绕通知：前后各记一条
pub fn tagged_advice(journal: &Journal, tag: &'static str) -> Advice {
    let journal = journal.clone();
    Advice::around(move |inv| {
        journal.push(format!("{}:before", tag));
        let result = inv.proceed();
        journal.push(format!("{}:after", tag));
        result
    })
}

pub fn tagged_advisor(journal: &Journal, tag: &'static str) -> Advisor {
    Advisor::unconditional(tagged_advice(journal, tag)).named(tag)
}

pub fn as_i64(value: &Value) -> i64 {
    downcast_value::<i64>(value).copied().unwrap_or(i64::MIN)
}

/// 统计 get/release 次数的非静态目标源
pub struct CountingTargetSource {
    target: Arc<dyn Bean>,
    pub gets: AtomicUsize,
    pub releases: AtomicUsize,
}

impl CountingTargetSource {
    pub fn new(target: Arc<dyn Bean>) -> Self {
        Self {
            target,
            gets: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl TargetSource for CountingTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(self.target.bean_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Arc::clone(&self.target)))
    }

    fn release_target(&self, _target: Arc<dyn Bean>) -> AopResult<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
