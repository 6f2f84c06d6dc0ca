mod common;

use chimera_aop::prelude::*;
use chimera_aop::AopProperties;
use chimera_core::{
    same_bean, Bean, BeanPostProcessor, ContainerError, Environment, MapPropertySource,
};
use common::*;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn calculator(journal: &Journal) -> Arc<dyn Bean> {
    Arc::new(CalculatorService::new(journal.clone()))
}

fn processor_for(registry: &Arc<DefaultAdvisorRegistry>) -> AopBeanPostProcessor {
    AopBeanPostProcessor::new(registry.clone())
}

fn is_proxy(bean: &Arc<dyn Bean>) -> bool {
    bean.as_any().is::<ProxyObject>()
}

#[test]
fn test_eligibility_is_computed_once_per_type() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let pointcut = {
        let evaluations = Arc::clone(&evaluations);
        Pointcut::from_fns(
            |class| class.name() == "CalculatorService",
            move |method, _| {
                evaluations.fetch_add(1, Ordering::SeqCst);
                Ok(method.name() == "add")
            },
        )
    };
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry
        .register("adder", Advisor::new(Advice::around(|inv| inv.proceed()), pointcut))
        .unwrap();
    let processor = processor_for(&registry);

    let journal = Journal::new();
    let first = processor
        .post_process_after_initialization(calculator(&journal), "first")
        .unwrap();
    assert!(is_proxy(&first));
    let after_first = evaluations.load(Ordering::SeqCst);
    assert!(after_first > 0);

    let second = processor
        .post_process_after_initialization(calculator(&journal), "second")
        .unwrap();
    assert!(is_proxy(&second));
    assert_eq!(evaluations.load(Ordering::SeqCst), after_first);
    assert_eq!(processor.cached_type_count(), 1);
}

#[test]
fn test_rejecting_class_filter_never_consults_method_matcher() {
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry
        .register(
            "elsewhere",
            Advisor::new(
                Advice::around(|inv| inv.proceed()),
                Pointcut::from_fns(
                    |class| class.name() == "InventoryService",
                    |_, _| panic!("method matcher must not run for rejected types"),
                ),
            ),
        )
        .unwrap();
    let processor = processor_for(&registry);

    let journal = Journal::new();
    let bean = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();
    assert!(!is_proxy(&bean));
    aop_call!(bean, "add", 1i64, 2i64).unwrap();
}

#[test]
fn test_advisors_applied_in_order() {
    init_test_logging();
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry
        .register("late", tagged_advisor(&journal, "late").with_order(10))
        .unwrap();
    registry
        .register("early", tagged_advisor(&journal, "early").with_order(5))
        .unwrap();
    let processor = processor_for(&registry);

    let bean = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();
    let result = aop_call!(bean, "add", 2i64, 3i64).unwrap();
    assert_eq!(as_i64(&result), 5);
    assert_eq!(
        journal.entries(),
        vec![
            "early:before",
            "late:before",
            "target:add",
            "late:after",
            "early:after"
        ]
    );
}

fn manual_proxy(journal: &Journal) -> (ProxyFactory, Arc<dyn Bean>) {
    let factory = ProxyFactory::for_target(calculator(journal));
    factory.add_advisor(tagged_advisor(journal, "manual")).unwrap();
    let proxy: Arc<dyn Bean> = factory.get_proxy().unwrap();
    (factory, proxy)
}

#[test]
fn test_advisors_are_appended_to_existing_proxy() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("auto", tagged_advisor(&journal, "auto")).unwrap();
    let processor = processor_for(&registry);

    let (factory, proxy) = manual_proxy(&journal);
    let processed = processor
        .post_process_after_initialization(Arc::clone(&proxy), "calculator")
        .unwrap();
    assert!(same_bean(&processed, &proxy));
    assert_eq!(factory.advisor_count(), 2);

    aop_call!(processed, "add", 1i64, 1i64).unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "manual:before",
            "auto:before",
            "target:add",
            "auto:after",
            "manual:after"
        ]
    );

    // 再处理一次不会重复加入
    processor
        .post_process_after_initialization(Arc::clone(&proxy), "calculator")
        .unwrap();
    assert_eq!(factory.advisor_count(), 2);
}

#[test]
fn test_advisors_can_be_spliced_in_front() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("auto", tagged_advisor(&journal, "auto")).unwrap();
    let processor = AopBeanPostProcessor::with_properties(
        registry,
        AopProperties {
            apply_advisors_first: true,
            ..AopProperties::default()
        },
    );

    let (_factory, proxy) = manual_proxy(&journal);
    let processed = processor
        .post_process_after_initialization(proxy, "calculator")
        .unwrap();
    aop_call!(processed, "add", 1i64, 1i64).unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "auto:before",
            "manual:before",
            "target:add",
            "manual:after",
            "auto:after"
        ]
    );
}

#[test]
fn test_frozen_proxy_is_wrapped_instead_of_modified() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("auto", tagged_advisor(&journal, "auto")).unwrap();
    let processor = processor_for(&registry);

    let (factory, proxy) = manual_proxy(&journal);
    factory.set_frozen(true);
    let processed = processor
        .post_process_after_initialization(Arc::clone(&proxy), "calculator")
        .unwrap();
    assert!(!same_bean(&processed, &proxy));
    assert!(is_proxy(&processed));
    assert_eq!(factory.advisor_count(), 1);

    aop_call!(processed, "add", 1i64, 1i64).unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "auto:before",
            "manual:before",
            "target:add",
            "manual:after",
            "auto:after"
        ]
    );
}

#[test]
fn test_advisor_in_creation_is_skipped_and_not_cached() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("plain", tagged_advisor(&journal, "plain")).unwrap();

    let processor: Arc<OnceCell<Arc<AopBeanPostProcessor>>> = Arc::new(OnceCell::new());
    let nested = Arc::new(OnceCell::<Arc<dyn Bean>>::new());
    {
        let processor = Arc::clone(&processor);
        let nested = Arc::clone(&nested);
        let journal = journal.clone();
        registry
            .register_factory("circular", move || {
                // 创建过程中处理另一个同类型的 Bean
                let processor = processor.get().expect("processor installed");
                let bean = processor.post_process_after_initialization(
                    Arc::new(CalculatorService::new(journal.clone())),
                    "dependency",
                )?;
                let _ = nested.set(bean);
                Ok(tagged_advisor(&journal, "circular"))
            })
            .unwrap();
    }
    let installed = processor.get_or_init(|| Arc::new(processor_for(&registry)));

    let outer = installed
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();

    // 依赖只拿到创建期间可用的通知器
    let dependency = Arc::clone(nested.get().expect("nested bean processed"));
    journal.clear();
    aop_call!(dependency, "add", 1i64, 1i64).unwrap();
    assert_eq!(journal.entries(), vec!["plain:before", "target:add", "plain:after"]);

    journal.clear();
    aop_call!(outer, "add", 1i64, 1i64).unwrap();
    assert_eq!(
        journal.entries(),
        vec![
            "plain:before",
            "circular:before",
            "target:add",
            "circular:after",
            "plain:after"
        ]
    );

    // 不完整的结果没有进入缓存，之后的 Bean 能看到全部通知器
    let later = installed
        .post_process_after_initialization(calculator(&journal), "later")
        .unwrap();
    journal.clear();
    aop_call!(later, "add", 1i64, 1i64).unwrap();
    assert_eq!(journal.entries().len(), 5);
}

#[test]
fn test_advisor_created_by_another_thread_is_awaited() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = Mutex::new(started_tx);
    {
        let journal = journal.clone();
        registry
            .register_factory("slowTracing", move || {
                let _ = started_tx.lock().send(());
                thread::sleep(Duration::from_millis(100));
                Ok(tagged_advisor(&journal, "slow"))
            })
            .unwrap();
    }
    let processor = Arc::new(processor_for(&registry));

    let first = {
        let processor = Arc::clone(&processor);
        let journal = journal.clone();
        thread::spawn(move || {
            processor
                .post_process_after_initialization(calculator(&journal), "orderService")
                .unwrap()
        })
    };
    started_rx.recv().unwrap();

    let second = processor
        .post_process_after_initialization(calculator(&journal), "userService")
        .unwrap();
    let first = first.join().unwrap();
    assert!(is_proxy(&first));
    assert!(is_proxy(&second));

    journal.clear();
    aop_call!(second, "add", 1i64, 1i64).unwrap();
    assert_eq!(journal.entries(), vec!["slow:before", "target:add", "slow:after"]);
    assert_eq!(processor.cached_type_count(), 1);
}

#[test]
fn test_advisor_beans_are_not_proxied() {
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("auditor", tagged_advisor(&journal, "auditor")).unwrap();
    let processor = processor_for(&registry);

    let bean = processor
        .post_process_after_initialization(calculator(&journal), "auditor")
        .unwrap();
    assert!(!is_proxy(&bean));
}

#[test]
fn test_failing_matcher_reports_post_processing_failure() {
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry
        .register(
            "broken",
            Advisor::new(
                Advice::around(|inv| inv.proceed()),
                Pointcut::from_fns(|_| true, |_, _| anyhow::bail!("matcher exploded")),
            ),
        )
        .unwrap();
    let processor = processor_for(&registry);

    let journal = Journal::new();
    let err = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .err()
        .unwrap();
    match err {
        ContainerError::PostProcessingFailed { bean, source } => {
            assert_eq!(bean, "calculator");
            assert!(format!("{:#}", source).contains("matcher exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(processor.cached_type_count(), 0);
}

#[test]
fn test_exposed_invocation_is_visible_to_inner_advice() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    {
        let seen = Arc::clone(&seen);
        registry
            .register(
                "inspector",
                Advisor::unconditional(Advice::before(move |_| {
                    let join_point = current_join_point()?;
                    seen.lock().push(join_point.signature());
                    Ok(())
                })),
            )
            .unwrap();
    }
    let processor = AopBeanPostProcessor::with_properties(
        registry,
        AopProperties {
            expose_invocation: true,
            ..AopProperties::default()
        },
    );

    let journal = Journal::new();
    let bean = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();
    aop_call!(bean, "add", 4i64, 5i64).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains("add"));
    assert!(matches!(current_join_point(), Err(AopError::InvocationNotExposed)));
}

#[test]
fn test_properties_from_environment() {
    let env = Environment::new().with_property_source(Box::new(
        MapPropertySource::new("test")
            .with_property("chimera.aop.proxy-target-class", true)
            .with_property("chimera.aop.expose-proxy", true),
    ));
    let journal = Journal::new();
    let registry = Arc::new(DefaultAdvisorRegistry::new());
    registry.register("auto", tagged_advisor(&journal, "auto")).unwrap();

    let processor = AopBeanPostProcessor::from_environment(registry, &env).unwrap();
    assert!(processor.properties().proxy_target_class);

    let bean = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();
    let proxy = bean.as_any().downcast_ref::<ProxyObject>().unwrap();
    assert_eq!(proxy.kind(), ProxyKind::Subclass);

    // 子类代理可以调用接口之外的方法
    aop_call!(bean, "reset").unwrap();
}

struct CountingAspect {
    pointcut: PointcutExpression,
}

static ASPECT_CALLS: AtomicUsize = AtomicUsize::new(0);

impl Aspect for CountingAspect {
    fn name(&self) -> &str {
        "countingAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn before(&self, _join_point: &JoinPoint) {
        ASPECT_CALLS.fetch_add(1, Ordering::SeqCst);
    }
}

fn counting_aspect() -> Arc<dyn Aspect> {
    Arc::new(CountingAspect {
        pointcut: PointcutExpression::execution("* Calculator*.add(..)"),
    })
}

submit_aspect!("countingAspect", counting_aspect);

#[test]
fn test_submitted_aspects_reach_global_registry() {
    let registry = global_registry();
    assert!(registry.contains("countingAspect"));

    let processor = AopBeanPostProcessor::new(registry.clone());
    let journal = Journal::new();
    let bean = processor
        .post_process_after_initialization(calculator(&journal), "calculator")
        .unwrap();
    assert!(is_proxy(&bean));

    let before = ASPECT_CALLS.load(Ordering::SeqCst);
    aop_call!(bean, "add", 1i64, 2i64).unwrap();
    aop_call!(bean, "fail").unwrap_err();
    assert_eq!(ASPECT_CALLS.load(Ordering::SeqCst), before + 1);
}
