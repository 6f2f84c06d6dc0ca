//! 池化目标源
//!
//! 维护一组有上限的目标实例：调用开始时借出一个，调用结束后归还。
//! 池耗尽时按 [`ExhaustedAction`] 阻塞等待或立即失败。

use chimera_core::{Bean, BeanClass};
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{AopError, AopResult};
use crate::target_source::{ObjectFactory, TargetSource};

/// 默认的最长等待时间
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

/// 池耗尽时的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedAction {
    /// 阻塞等待归还，`max_wait` 为 `None` 时无限等待
    Block { max_wait: Option<Duration> },
    /// 立即返回 [`AopError::PoolExhausted`]
    Fail,
}

impl Default for ExhaustedAction {
    fn default() -> Self {
        ExhaustedAction::Block {
            max_wait: Some(DEFAULT_MAX_WAIT),
        }
    }
}

/// 池配置
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 实例总数上限（借出 + 空闲）
    pub max_size: usize,
    /// 创建时是否预先填满
    pub prefill: bool,
    pub exhausted_action: ExhaustedAction,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            prefill: true,
            exhausted_action: ExhaustedAction::default(),
        }
    }
}

impl PoolConfig {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    pub fn prefill(mut self, prefill: bool) -> Self {
        self.prefill = prefill;
        self
    }

    pub fn exhausted_action(mut self, action: ExhaustedAction) -> Self {
        self.exhausted_action = action;
        self
    }
}

/// 池统计（只读快照）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub max_size: usize,
    pub created: u64,
    pub borrowed: u64,
    pub returned: u64,
}

struct PoolState {
    idle: Vec<Arc<dyn Bean>>,
    active: usize,
    closed: bool,
    created: u64,
    borrowed: u64,
    returned: u64,
}

impl PoolState {
    fn total(&self) -> usize {
        self.active + self.idle.len()
    }
}

/// 池化目标源
pub struct PooledTargetSource {
    factory: Arc<dyn ObjectFactory>,
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl PooledTargetSource {
    pub fn new(factory: Arc<dyn ObjectFactory>, config: PoolConfig) -> AopResult<Self> {
        if config.max_size == 0 {
            return Err(AopError::Configuration(
                "Pool max_size must be at least 1".to_string(),
            ));
        }

        let mut idle = Vec::with_capacity(config.max_size);
        if config.prefill {
            for _ in 0..config.max_size {
                idle.push(factory.create().map_err(AopError::TargetCreation)?);
            }
        }

        let class = factory.object_class();
        tracing::debug!(
            class = class.name(),
            max_size = config.max_size,
            prefilled = idle.len(),
            "Created target pool"
        );

        let created = idle.len() as u64;
        Ok(Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle,
                active: 0,
                closed: false,
                created,
                borrowed: 0,
                returned: 0,
            }),
            available: Condvar::new(),
        })
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            active: state.active,
            idle: state.idle.len(),
            max_size: self.config.max_size,
            created: state.created,
            borrowed: state.borrowed,
            returned: state.returned,
        }
    }

    /// 关闭池：销毁空闲实例，之后归还的实例直接销毁
    pub fn close(&self) {
        let drained = {
            let mut state = self.state.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.available.notify_all();

        for instance in drained {
            if let Err(e) = self.factory.destroy(instance) {
                tracing::warn!(error = %e, "Failed to destroy pooled instance on close");
            }
        }
    }

    fn borrow(&self, state: &mut MutexGuard<'_, PoolState>) -> AopResult<Option<Arc<dyn Bean>>> {
        let started = Instant::now();
        let deadline = match self.config.exhausted_action {
            ExhaustedAction::Block {
                max_wait: Some(wait),
            } => Some(started + wait),
            _ => None,
        };

        loop {
            if state.closed {
                return Err(AopError::Configuration(
                    "Target pool has been closed".to_string(),
                ));
            }

            if let Some(instance) = state.idle.pop() {
                state.active += 1;
                state.borrowed += 1;
                return Ok(Some(instance));
            }

            if state.total() < self.config.max_size {
                // 先占位再解锁创建，避免并发超过上限
                state.active += 1;
                let created = MutexGuard::unlocked(state, || self.factory.create());
                return match created {
                    Ok(instance) => {
                        state.created += 1;
                        state.borrowed += 1;
                        Ok(Some(instance))
                    }
                    Err(e) => {
                        state.active -= 1;
                        self.available.notify_one();
                        Err(AopError::TargetCreation(e))
                    }
                };
            }

            match self.config.exhausted_action {
                ExhaustedAction::Fail => {
                    return Err(AopError::PoolExhausted {
                        max_size: self.config.max_size,
                        waited: started.elapsed(),
                    });
                }
                ExhaustedAction::Block { .. } => match deadline {
                    None => {
                        self.available.wait(state);
                    }
                    Some(deadline) => {
                        if Instant::now() >= deadline {
                            return Err(AopError::PoolExhausted {
                                max_size: self.config.max_size,
                                waited: started.elapsed(),
                            });
                        }
                        self.available.wait_until(state, deadline);
                    }
                },
            }
        }
    }
}

impl TargetSource for PooledTargetSource {
    fn target_class(&self) -> Option<Arc<BeanClass>> {
        Some(self.factory.object_class())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn get_target(&self) -> AopResult<Option<Arc<dyn Bean>>> {
        let mut state = self.state.lock();
        self.borrow(&mut state)
    }

    fn release_target(&self, target: Arc<dyn Bean>) -> AopResult<()> {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        state.returned += 1;

        if state.closed {
            drop(state);
            return self.factory.destroy(target).map_err(AopError::TargetRelease);
        }

        state.idle.push(target);
        drop(state);
        self.available.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_source::FunctionFactory;
    use chimera_core::{unit, Method, Value};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Worker;

    impl Bean for Worker {
        fn bean_class(&self) -> Arc<BeanClass> {
            BeanClass::builder("Worker").method("work").build()
        }

        fn invoke(&self, _method: &Method, _args: &[Value]) -> anyhow::Result<Value> {
            Ok(unit())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn factory(created: Arc<AtomicUsize>) -> Arc<dyn ObjectFactory> {
        Arc::new(FunctionFactory::new(
            BeanClass::builder("Worker").build(),
            move || {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Worker) as Arc<dyn Bean>)
            },
        ))
    }

    #[test]
    fn test_prefill_and_borrow_return() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool =
            PooledTargetSource::new(factory(Arc::clone(&created)), PoolConfig::new(2)).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count(), 2);

        let a = pool.get_target().unwrap().unwrap();
        let b = pool.get_target().unwrap().unwrap();
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.idle_count(), 0);

        pool.release_target(a).unwrap();
        pool.release_target(b).unwrap();
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.borrowed, 2);
        assert_eq!(stats.returned, 2);
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fail_fast_when_exhausted() {
        let config = PoolConfig::new(1).exhausted_action(ExhaustedAction::Fail);
        let pool = PooledTargetSource::new(factory(Arc::new(AtomicUsize::new(0))), config).unwrap();

        let held = pool.get_target().unwrap().unwrap();
        assert!(matches!(
            pool.get_target(),
            Err(AopError::PoolExhausted { max_size: 1, .. })
        ));
        pool.release_target(held).unwrap();
        assert!(pool.get_target().is_ok());
    }

    #[test]
    fn test_block_times_out() {
        let config = PoolConfig::new(1).exhausted_action(ExhaustedAction::Block {
            max_wait: Some(Duration::from_millis(20)),
        });
        let pool = PooledTargetSource::new(factory(Arc::new(AtomicUsize::new(0))), config).unwrap();

        let _held = pool.get_target().unwrap();
        let started = Instant::now();
        let err = pool.get_target().err().unwrap();
        assert!(matches!(err, AopError::PoolExhausted { .. }));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_blocked_borrower_wakes_on_release() {
        let config = PoolConfig::new(1).exhausted_action(ExhaustedAction::Block { max_wait: None });
        let pool = Arc::new(
            PooledTargetSource::new(factory(Arc::new(AtomicUsize::new(0))), config).unwrap(),
        );

        let held = pool.get_target().unwrap().unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let target = pool.get_target().unwrap().unwrap();
                pool.release_target(target).unwrap();
            })
        };

        thread::sleep(Duration::from_millis(20));
        pool.release_target(held).unwrap();
        waiter.join().unwrap();
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_lazy_growth_without_prefill() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = PooledTargetSource::new(
            factory(Arc::clone(&created)),
            PoolConfig::new(3).prefill(false),
        )
        .unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let t = pool.get_target().unwrap().unwrap();
        pool.release_target(t).unwrap();
        let t = pool.get_target().unwrap().unwrap();
        pool.release_target(t).unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_pool_rejects_borrow() {
        let pool =
            PooledTargetSource::new(factory(Arc::new(AtomicUsize::new(0))), PoolConfig::new(1))
                .unwrap();
        pool.close();
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(pool.get_target(), Err(AopError::Configuration(_))));
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let result =
            PooledTargetSource::new(factory(Arc::new(AtomicUsize::new(0))), PoolConfig::new(0));
        assert!(result.is_err());
    }
}
