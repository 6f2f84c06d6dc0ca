//! 拦截器链构建
//!
//! 针对一次被调用的方法，从通知器列表中挑出适用的部分，
//! 保持列表中的相对顺序：第一个通知器位于最外层。

use chimera_core::{BeanClass, Method};
use std::fmt;
use std::sync::Arc;

use crate::advice::MethodInterceptor;
use crate::advisor::{Advisor, AdvisorKind};
use crate::error::AopResult;
use crate::pointcut::MethodMatcher;

/// 链上的一环
#[derive(Clone)]
pub enum ChainLink {
    /// 构建时已确定适用
    Static(Arc<dyn MethodInterceptor>),
    /// 还需要在调用时检查参数
    Dynamic {
        interceptor: Arc<dyn MethodInterceptor>,
        matcher: Arc<dyn MethodMatcher>,
    },
}

impl fmt::Debug for ChainLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainLink::Static(_) => write!(f, "Static"),
            ChainLink::Dynamic { .. } => write!(f, "Dynamic"),
        }
    }
}

/// 构建某个方法的拦截器链
///
/// `pre_filtered` 为 true 时调用方保证所有通知器都已匹配目标类型，
/// 此时跳过类型过滤，但仍然检查方法匹配。
pub fn build_chain(
    advisors: &[Advisor],
    method: &Method,
    target_class: &BeanClass,
    pre_filtered: bool,
) -> AopResult<Vec<ChainLink>> {
    let mut chain = Vec::with_capacity(advisors.len());

    for advisor in advisors {
        match advisor.kind() {
            AdvisorKind::Interceptor { pointcut: None, .. } => {
                chain.push(ChainLink::Static(Arc::clone(advisor.method_interceptor())));
            }
            AdvisorKind::Interceptor {
                pointcut: Some(pointcut),
                ..
            } => {
                if !pre_filtered && !pointcut.class_filter().matches(target_class) {
                    continue;
                }
                if !pointcut.matches_method(method, target_class)? {
                    continue;
                }
                let interceptor = Arc::clone(advisor.method_interceptor());
                let matcher = pointcut.method_matcher();
                if matcher.is_runtime() {
                    chain.push(ChainLink::Dynamic {
                        interceptor,
                        matcher: Arc::clone(matcher),
                    });
                } else {
                    chain.push(ChainLink::Static(interceptor));
                }
            }
            AdvisorKind::Introduction {
                interfaces,
                class_filter,
            } => {
                if !pre_filtered {
                    if let Some(filter) = class_filter {
                        if !filter.matches(target_class) {
                            continue;
                        }
                    }
                }
                // 只参与被引入接口上的调用
                if interfaces
                    .iter()
                    .any(|i| i.name() == method.declaring_type())
                {
                    chain.push(ChainLink::Static(Arc::clone(advisor.method_interceptor())));
                }
            }
        }
    }

    tracing::trace!(
        method = %method,
        target = target_class.name(),
        links = chain.len(),
        "Built interceptor chain"
    );
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Advice;
    use crate::pointcut::{FnMethodMatcher, Pointcut};
    use chimera_core::{unit, Value};

    fn noop() -> Advice {
        Advice::around(|_| Ok(unit()))
    }

    struct EvenArgs;

    impl MethodMatcher for EvenArgs {
        fn matches(&self, _: &Method, _: &BeanClass) -> anyhow::Result<bool> {
            Ok(true)
        }

        fn is_runtime(&self) -> bool {
            true
        }

        fn matches_args(&self, _: &Method, _: &BeanClass, args: &[Value]) -> anyhow::Result<bool> {
            Ok(args.len() % 2 == 0)
        }
    }

    #[test]
    fn test_chain_filters_by_method_and_keeps_order() {
        let class = BeanClass::builder("OrderService")
            .method("place")
            .method("cancel")
            .build();
        let place = class.find_method("place").unwrap();

        let a = Advisor::unconditional(noop());
        let b = Advisor::new(noop(), Pointcut::method_names(["cancel"]));
        let c = Advisor::new(noop(), Pointcut::method_names(["pl*"]));
        let d = Advisor::new(noop(), Pointcut::for_methods(EvenArgs));

        let chain = build_chain(&[a, b, c, d], &place, &class, false).unwrap();
        assert_eq!(chain.len(), 3);
        assert!(matches!(chain[0], ChainLink::Static(_)));
        assert!(matches!(chain[1], ChainLink::Static(_)));
        assert!(matches!(chain[2], ChainLink::Dynamic { .. }));
    }

    #[test]
    fn test_pre_filtered_skips_class_filter_only() {
        let class = BeanClass::builder("OrderService").method("place").build();
        let place = class.find_method("place").unwrap();

        let wrong_type = Advisor::new(
            noop(),
            Pointcut::from_fns(|c| c.name() == "Other", |_, _| Ok(true)),
        );
        let wrong_method = Advisor::new(
            noop(),
            Pointcut::for_methods(FnMethodMatcher(|m: &Method, _: &BeanClass| {
                Ok(m.name() == "cancel")
            })),
        );

        let advisors = [wrong_type, wrong_method];
        assert!(build_chain(&advisors, &place, &class, false)
            .unwrap()
            .is_empty());

        let chain = build_chain(&advisors, &place, &class, true).unwrap();
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_empty_advisors_give_empty_chain() {
        let class = BeanClass::builder("Plain").method("run").build();
        let run = class.find_method("run").unwrap();
        assert!(build_chain(&[], &run, &class, false).unwrap().is_empty());
    }
}
