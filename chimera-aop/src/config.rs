//! AOP 配置属性
//!
//! 从 [`Environment`] 读取 `chimera.aop.*` 配置：
//!
//! ```toml
//! [chimera.aop]
//! proxy-target-class = false
//! expose-proxy = true
//! apply-advisors-first = false
//! advisor-name-prefix = "tx"
//!
//! [chimera.aop.pool]
//! max-size = 8
//! max-wait-ms = 5000
//! exhausted-action = "block"
//! ```

use chimera_core::{ContainerError, Environment};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::advised::ProxyConfig;
use crate::error::AopResult;
use crate::pool::{ExhaustedAction, PoolConfig, DEFAULT_MAX_WAIT};

/// 配置前缀
pub const AOP_PROPERTY_PREFIX: &str = "chimera.aop";

/// 池耗尽策略（配置形式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExhaustedPolicy {
    #[default]
    Block,
    Fail,
}

impl FromStr for ExhaustedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(ExhaustedPolicy::Block),
            "fail" => Ok(ExhaustedPolicy::Fail),
            other => Err(format!("expected 'block' or 'fail', got '{}'", other)),
        }
    }
}

impl fmt::Display for ExhaustedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExhaustedPolicy::Block => write!(f, "block"),
            ExhaustedPolicy::Fail => write!(f, "fail"),
        }
    }
}

/// 池化目标源配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PoolProperties {
    pub max_size: usize,
    /// 阻塞等待上限，0 表示无限等待
    pub max_wait_ms: u64,
    pub exhausted_action: ExhaustedPolicy,
    pub prefill: bool,
}

impl Default for PoolProperties {
    fn default() -> Self {
        Self {
            max_size: 8,
            max_wait_ms: DEFAULT_MAX_WAIT.as_millis() as u64,
            exhausted_action: ExhaustedPolicy::Block,
            prefill: true,
        }
    }
}

impl PoolProperties {
    pub fn to_pool_config(&self) -> PoolConfig {
        let action = match self.exhausted_action {
            ExhaustedPolicy::Fail => ExhaustedAction::Fail,
            ExhaustedPolicy::Block => ExhaustedAction::Block {
                max_wait: (self.max_wait_ms > 0).then(|| Duration::from_millis(self.max_wait_ms)),
            },
        };
        PoolConfig::new(self.max_size)
            .prefill(self.prefill)
            .exhausted_action(action)
    }
}

/// 自动代理配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AopProperties {
    /// 关闭后自动代理创建器原样返回所有对象
    pub enabled: bool,
    pub proxy_target_class: bool,
    pub expose_proxy: bool,
    pub optimize: bool,
    /// 包装已有代理时，新通知器放在已有通知器之前
    pub apply_advisors_first: bool,
    /// 只考虑名称以此开头的通知器
    pub advisor_name_prefix: Option<String>,
    /// 在自动代理的链最前面发布当前连接点
    pub expose_invocation: bool,
    pub pool: PoolProperties,
}

impl Default for AopProperties {
    fn default() -> Self {
        Self {
            enabled: true,
            proxy_target_class: false,
            expose_proxy: false,
            optimize: false,
            apply_advisors_first: false,
            advisor_name_prefix: None,
            expose_invocation: false,
            pool: PoolProperties::default(),
        }
    }
}

fn key(name: &str) -> String {
    format!("{}.{}", AOP_PROPERTY_PREFIX, name)
}

fn read<T>(env: &Environment, name: &str, target: &mut T) -> AopResult<()>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Some(value) = env.get_parsed::<T>(&key(name))? {
        *target = value;
    }
    Ok(())
}

impl AopProperties {
    /// 从环境读取，缺失的键使用默认值，无法解析的值返回错误
    pub fn from_environment(env: &Environment) -> AopResult<Self> {
        let mut props = Self::default();

        read(env, "enabled", &mut props.enabled)?;
        read(env, "proxy-target-class", &mut props.proxy_target_class)?;
        read(env, "expose-proxy", &mut props.expose_proxy)?;
        read(env, "optimize", &mut props.optimize)?;
        read(env, "apply-advisors-first", &mut props.apply_advisors_first)?;
        read(env, "expose-invocation", &mut props.expose_invocation)?;
        props.advisor_name_prefix = env
            .get_string(&key("advisor-name-prefix"))
            .filter(|prefix| !prefix.is_empty());

        read(env, "pool.max-size", &mut props.pool.max_size)?;
        read(env, "pool.max-wait-ms", &mut props.pool.max_wait_ms)?;
        read(env, "pool.exhausted-action", &mut props.pool.exhausted_action)?;
        read(env, "pool.prefill", &mut props.pool.prefill)?;

        if props.pool.max_size == 0 {
            return Err(ContainerError::Configuration(format!(
                "'{}' must be at least 1",
                key("pool.max-size")
            ))
            .into());
        }

        tracing::debug!(properties = ?props, "Loaded AOP properties");
        Ok(props)
    }

    /// 自动代理创建的代理使用的标志
    pub fn to_proxy_config(&self) -> ProxyConfig {
        ProxyConfig {
            proxy_target_class: self.proxy_target_class,
            optimize: self.optimize,
            expose_proxy: self.expose_proxy,
            ..ProxyConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AopError;
    use chimera_core::MapPropertySource;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        let mut source = MapPropertySource::new("test");
        for (k, v) in pairs {
            source = source.with_property(*k, *v);
        }
        Environment::new().with_property_source(Box::new(source))
    }

    #[test]
    fn test_defaults_when_absent() {
        let props = AopProperties::from_environment(&Environment::new()).unwrap();
        assert_eq!(props, AopProperties::default());
        assert!(props.enabled);
        assert_eq!(props.pool.to_pool_config().exhausted_action, ExhaustedAction::default());
    }

    #[test]
    fn test_reads_all_keys() {
        let props = AopProperties::from_environment(&env(&[
            ("chimera.aop.proxy-target-class", "true"),
            ("chimera.aop.expose-proxy", "true"),
            ("chimera.aop.apply-advisors-first", "true"),
            ("chimera.aop.advisor-name-prefix", "tx"),
            ("chimera.aop.pool.max-size", "2"),
            ("chimera.aop.pool.max-wait-ms", "0"),
            ("chimera.aop.pool.exhausted-action", "fail"),
        ]))
        .unwrap();

        assert!(props.proxy_target_class);
        assert!(props.expose_proxy);
        assert!(props.apply_advisors_first);
        assert_eq!(props.advisor_name_prefix.as_deref(), Some("tx"));
        assert_eq!(props.pool.max_size, 2);
        assert_eq!(props.pool.exhausted_action, ExhaustedPolicy::Fail);

        let config = props.to_proxy_config();
        assert!(config.proxy_target_class);
        assert!(config.expose_proxy);
        assert!(!config.frozen);
    }

    #[test]
    fn test_zero_wait_blocks_forever() {
        let props = PoolProperties {
            max_wait_ms: 0,
            ..PoolProperties::default()
        };
        assert_eq!(
            props.to_pool_config().exhausted_action,
            ExhaustedAction::Block { max_wait: None }
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AopProperties::from_environment(&env(&[(
            "chimera.aop.pool.exhausted-action",
            "grow",
        )]))
        .unwrap_err();
        assert!(matches!(err, AopError::Container(ContainerError::Configuration(_))));

        let zero = env(&[("chimera.aop.pool.max-size", "0")]);
        assert!(AopProperties::from_environment(&zero).is_err());
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        let props: AopProperties = toml::from_str(
            r#"
            expose-proxy = true
            [pool]
            max-size = 4
            exhausted-action = "fail"
            "#,
        )
        .unwrap();
        assert!(props.expose_proxy);
        assert_eq!(props.pool.max_size, 4);
        assert_eq!(props.pool.max_wait_ms, 5000);
        assert_eq!(props.pool.exhausted_action, ExhaustedPolicy::Fail);
    }
}
