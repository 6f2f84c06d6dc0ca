//! 切点（Pointcut）
//!
//! 切点由两部分组成：
//! - [`ClassFilter`]：粗粒度的类型过滤，代价低
//! - [`MethodMatcher`]：针对具体方法签名的匹配，代价可能较高
//!
//! 匹配总是先过类型过滤，类型被拒绝时方法匹配器不会被调用。

use chimera_core::{BeanClass, Method, Value};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

use crate::error::{AopError, AopResult};

/// 类型过滤器
pub trait ClassFilter: Send + Sync {
    fn matches(&self, class: &BeanClass) -> bool;
}

/// 方法匹配器
pub trait MethodMatcher: Send + Sync {
    /// 静态匹配：只看方法签名和目标类型
    fn matches(&self, method: &Method, target_class: &BeanClass) -> anyhow::Result<bool>;

    /// 是否需要在每次调用时再检查参数
    fn is_runtime(&self) -> bool {
        false
    }

    /// 运行时匹配，只有静态匹配通过且 `is_runtime()` 为 true 时才调用
    fn matches_args(
        &self,
        _method: &Method,
        _target_class: &BeanClass,
        _args: &[Value],
    ) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// 无条件匹配所有方法
    fn matches_every_method(&self) -> bool {
        false
    }
}

struct TrueClassFilter;

impl ClassFilter for TrueClassFilter {
    fn matches(&self, _class: &BeanClass) -> bool {
        true
    }
}

struct TrueMethodMatcher;

impl MethodMatcher for TrueMethodMatcher {
    fn matches(&self, _method: &Method, _target_class: &BeanClass) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn matches_every_method(&self) -> bool {
        true
    }
}

/// 闭包形式的类型过滤器
pub struct FnClassFilter<F>(pub F);

impl<F> ClassFilter for FnClassFilter<F>
where
    F: Fn(&BeanClass) -> bool + Send + Sync,
{
    fn matches(&self, class: &BeanClass) -> bool {
        (self.0)(class)
    }
}

/// 闭包形式的方法匹配器
pub struct FnMethodMatcher<F>(pub F);

impl<F> MethodMatcher for FnMethodMatcher<F>
where
    F: Fn(&Method, &BeanClass) -> anyhow::Result<bool> + Send + Sync,
{
    fn matches(&self, method: &Method, target_class: &BeanClass) -> anyhow::Result<bool> {
        (self.0)(method, target_class)
    }
}

/// 按方法名匹配（支持 `*` 通配符）
pub struct NameMatchMethodMatcher {
    patterns: Vec<String>,
}

impl NameMatchMethodMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl MethodMatcher for NameMatchMethodMatcher {
    fn matches(&self, method: &Method, _target_class: &BeanClass) -> anyhow::Result<bool> {
        Ok(self
            .patterns
            .iter()
            .any(|p| simple_match(p, method.name())))
    }
}

/// 切点
#[derive(Clone)]
pub struct Pointcut {
    description: Arc<str>,
    class_filter: Arc<dyn ClassFilter>,
    method_matcher: Arc<dyn MethodMatcher>,
}

impl Pointcut {
    pub fn new(
        class_filter: impl ClassFilter + 'static,
        method_matcher: impl MethodMatcher + 'static,
    ) -> Self {
        Self {
            description: Arc::from("Pointcut"),
            class_filter: Arc::new(class_filter),
            method_matcher: Arc::new(method_matcher),
        }
    }

    /// 匹配一切
    pub fn all() -> Self {
        Self::new(TrueClassFilter, TrueMethodMatcher).described("Pointcut.TRUE")
    }

    /// 只按类型过滤，类型匹配时匹配其全部方法
    pub fn for_class(class_filter: impl ClassFilter + 'static) -> Self {
        Self::new(class_filter, TrueMethodMatcher).described("ClassFilterPointcut")
    }

    /// 只按方法匹配，接受任意类型
    pub fn for_methods(method_matcher: impl MethodMatcher + 'static) -> Self {
        Self::new(TrueClassFilter, method_matcher).described("MethodMatcherPointcut")
    }

    /// 类型过滤闭包 + 方法匹配闭包
    pub fn from_fns<C, M>(class_fn: C, method_fn: M) -> Self
    where
        C: Fn(&BeanClass) -> bool + Send + Sync + 'static,
        M: Fn(&Method, &BeanClass) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self::new(FnClassFilter(class_fn), FnMethodMatcher(method_fn)).described("FnPointcut")
    }

    /// 按方法名匹配
    pub fn method_names<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let matcher = NameMatchMethodMatcher::new(patterns);
        let description = format!("NameMatch[{}]", matcher.patterns.join(", "));
        Self::for_methods(matcher).described(description)
    }

    /// 由切点表达式构建
    pub fn expression(expression: PointcutExpression) -> Self {
        let description = format!("{:?}", expression);
        let expression = Arc::new(expression);
        Self {
            description: Arc::from(description),
            class_filter: Arc::new(ExpressionClassFilter(Arc::clone(&expression))),
            method_matcher: Arc::new(ExpressionMethodMatcher(expression)),
        }
    }

    /// 设置描述（用于日志和错误信息）
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Arc::from(description.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn class_filter(&self) -> &dyn ClassFilter {
        self.class_filter.as_ref()
    }

    pub fn method_matcher(&self) -> &Arc<dyn MethodMatcher> {
        &self.method_matcher
    }

    /// 完整匹配：先类型后方法
    pub fn matches(&self, class: &BeanClass, method: &Method) -> AopResult<bool> {
        if !self.class_filter.matches(class) {
            return Ok(false);
        }
        self.matches_method(method, class)
    }

    /// 只做方法匹配（调用方已经保证类型匹配）
    pub fn matches_method(&self, method: &Method, class: &BeanClass) -> AopResult<bool> {
        self.method_matcher
            .matches(method, class)
            .map_err(|source| AopError::MatchEvaluation {
                pointcut: self.description.to_string(),
                method: method.signature(),
                source,
            })
    }

    /// 类型级别的适用性：是否可能匹配该类型上的任意一个方法
    pub fn can_apply(&self, class: &BeanClass) -> AopResult<bool> {
        if !self.class_filter.matches(class) {
            return Ok(false);
        }
        if self.method_matcher.matches_every_method() {
            return Ok(true);
        }
        for method in class.all_methods() {
            if self.matches_method(&method, class)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointcut({})", self.description)
    }
}

/// 切点表达式
///
/// 用于匹配 (类型, 方法) 对
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型（含父类、接口）的所有方法
    /// 例如：TypePattern("*Service")
    TypePattern(String),

    /// 匹配特定方法名
    /// 例如：MethodPattern("get_*")
    MethodPattern(String),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(Arc<dyn Fn(&BeanClass, &Method) -> bool + Send + Sync>),

    And(Box<PointcutExpression>, Box<PointcutExpression>),

    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 检查 (类型, 方法) 是否匹配
    pub fn matches(&self, class: &BeanClass, method: &Method) -> bool {
        match self {
            PointcutExpression::All => true,
            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, class),
            PointcutExpression::MethodPattern(pattern) => simple_match(pattern, method.name()),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                Self::type_matches(type_pattern, class)
                    && simple_match(method_pattern, method.name())
            }
            PointcutExpression::TypeRegex(regex) => {
                class.type_names().iter().any(|n| regex.is_match(n))
            }
            PointcutExpression::MethodRegex(regex) => regex.is_match(method.name()),
            PointcutExpression::Custom(func) => func(class, method),
            PointcutExpression::And(left, right) => {
                left.matches(class, method) && right.matches(class, method)
            }
            PointcutExpression::Or(left, right) => {
                left.matches(class, method) || right.matches(class, method)
            }
            PointcutExpression::Not(expr) => !expr.matches(class, method),
        }
    }

    /// 类型级别的预判：返回 false 表示该类型上不可能有方法匹配
    pub fn could_match_class(&self, class: &BeanClass) -> bool {
        match self {
            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, class),
            PointcutExpression::Execution { type_pattern, .. } => {
                Self::type_matches(type_pattern, class)
            }
            PointcutExpression::TypeRegex(regex) => {
                class.type_names().iter().any(|n| regex.is_match(n))
            }
            PointcutExpression::And(left, right) => {
                left.could_match_class(class) && right.could_match_class(class)
            }
            PointcutExpression::Or(left, right) => {
                left.could_match_class(class) || right.could_match_class(class)
            }
            PointcutExpression::Not(expr) if expr.is_type_only() => !expr.could_match_class(class),
            _ => true,
        }
    }

    /// 表达式是否只依赖类型
    fn is_type_only(&self) -> bool {
        match self {
            PointcutExpression::All
            | PointcutExpression::TypePattern(_)
            | PointcutExpression::TypeRegex(_) => true,
            PointcutExpression::And(left, right) | PointcutExpression::Or(left, right) => {
                left.is_type_only() && right.is_type_only()
            }
            PointcutExpression::Not(expr) => expr.is_type_only(),
            _ => false,
        }
    }

    /// 类型模式匹配类型自身、父类链或任一接口
    fn type_matches(pattern: &str, class: &BeanClass) -> bool {
        class.type_names().iter().any(|n| simple_match(pattern, n))
    }

    /// 创建 execution 表达式
    ///
    /// 格式：`返回类型 类型名.方法名(参数)`，例如 `* UserService.get_user(..)`
    pub fn execution(expression: &str) -> Self {
        let parts: Vec<&str> = expression.split_whitespace().collect();

        let Some(method_part) = parts.get(1) else {
            return PointcutExpression::All;
        };
        let method_part = method_part
            .split_once('(')
            .map(|(head, _)| head)
            .unwrap_or(method_part);

        match method_part.rsplit_once('.') {
            Some((type_pattern, method_pattern)) => PointcutExpression::Execution {
                type_pattern: type_pattern.to_string(),
                method_pattern: method_pattern.to_string(),
            },
            None => PointcutExpression::MethodPattern(method_part.to_string()),
        }
    }

    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => write!(f, "Execution({}.{})", type_pattern, method_pattern),
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

struct ExpressionClassFilter(Arc<PointcutExpression>);

impl ClassFilter for ExpressionClassFilter {
    fn matches(&self, class: &BeanClass) -> bool {
        self.0.could_match_class(class)
    }
}

struct ExpressionMethodMatcher(Arc<PointcutExpression>);

impl MethodMatcher for ExpressionMethodMatcher {
    fn matches(&self, method: &Method, target_class: &BeanClass) -> anyhow::Result<bool> {
        Ok(self.0.matches(target_class, method))
    }

    fn matches_every_method(&self) -> bool {
        matches!(*self.0, PointcutExpression::All)
    }
}

/// `*` 通配符匹配
///
/// - `*` 匹配任意字符串
/// - `User*`、`*Service`、`*Service*`、`get*By*`
pub fn simple_match(pattern: &str, target: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == target;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let (first, rest) = match segments.split_first() {
        Some(split) => split,
        None => return true,
    };
    let Some(mut remaining) = target.strip_prefix(first) else {
        return false;
    };

    let (last, middle) = match rest.split_last() {
        Some(split) => split,
        None => return remaining.is_empty(),
    };
    for segment in middle {
        match remaining.find(segment) {
            Some(pos) => remaining = &remaining[pos + segment.len()..],
            None => return false,
        }
    }
    remaining.len() >= last.len() && remaining.ends_with(last)
}
