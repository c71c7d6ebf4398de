//! 配置模块：客户端默认值（YAML/JSON + 环境变量）。
//!
//! Client configuration.
//!
//! [`ClientConfig`] holds the defaults every request built from it starts with:
//! cache, retry and debounce settings, timeout selection and an optional base
//! URL. It can be loaded from YAML or JSON, and the `FETCH_*` environment
//! variables override what the file says. Every field is optional; missing
//! fields take the built-in defaults.
//!
//! ```rust
//! use resilient_fetch::config::ClientConfig;
//!
//! let config = ClientConfig::from_yaml_str(
//!     "cache:\n  enabled: true\n  ttl_ms: 120000\nretry:\n  enabled: true\n",
//! )
//! .unwrap();
//! assert!(config.cache_config().enabled);
//! assert_eq!(config.retry_config().max_retries, 3);
//! ```

mod timeouts;

pub use timeouts::TimeoutPolicy;

use crate::cache::CacheStore;
use crate::client::options::{CacheConfig, RequestOptionsBuilder};
use crate::resilience::debounce::DebounceConfig;
use crate::resilience::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_ms: 300_000,
            sweep_interval_ms: CacheStore::DEFAULT_SWEEP_INTERVAL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub enabled: bool,
    pub max_retries: u32,
    pub delay_ms: u64,
    /// Opt-in exponential backoff; absent means a fixed delay.
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 3,
            delay_ms: 1000,
            backoff_multiplier: None,
            max_delay_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebounceSection {
    pub enabled: bool,
    pub delay_ms: u64,
}

impl Default for DebounceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutSection {
    pub default_ms: u64,
    pub long_ms: u64,
    pub long_running_paths: Vec<String>,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let policy = TimeoutPolicy::default();
        Self {
            default_ms: policy.default.as_millis() as u64,
            long_ms: policy.long.as_millis() as u64,
            long_running_paths: policy.long_running_paths,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub cache: CacheSection,
    pub retry: RetrySection,
    pub debounce: DebounceSection,
    pub timeouts: TimeoutSection,
}

impl ClientConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&raw),
            other => Err(Error::configuration_with_context(
                "unsupported config file extension",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(format!("got {:?}, expected json/yaml/yml", other))
                    .with_source("config_loader"),
            )),
        }
    }

    /// Apply `FETCH_BASE_URL`, `FETCH_HTTP_TIMEOUT_SECS`,
    /// `FETCH_HTTP_LONG_TIMEOUT_SECS` and `FETCH_CACHE_SWEEP_SECS`.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = env::var("FETCH_BASE_URL") {
            if !base.trim().is_empty() {
                self.base_url = Some(base);
            }
        }
        if let Some(ms) = env_secs_as_ms("FETCH_HTTP_TIMEOUT_SECS") {
            self.timeouts.default_ms = ms;
        }
        if let Some(ms) = env_secs_as_ms("FETCH_HTTP_LONG_TIMEOUT_SECS") {
            self.timeouts.long_ms = ms;
        }
        if let Some(ms) = env_secs_as_ms("FETCH_CACHE_SWEEP_SECS") {
            self.cache.sweep_interval_ms = ms;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field: &str, details: &str| {
            Err(Error::configuration_with_context(
                "invalid client configuration",
                ErrorContext::new()
                    .with_field_path(field)
                    .with_details(details)
                    .with_source("config_loader"),
            ))
        };
        if self.timeouts.default_ms == 0 {
            return invalid("timeouts.default_ms", "must be greater than zero");
        }
        if self.timeouts.long_ms == 0 {
            return invalid("timeouts.long_ms", "must be greater than zero");
        }
        if self.cache.sweep_interval_ms == 0 {
            return invalid("cache.sweep_interval_ms", "must be greater than zero");
        }
        if let Some(m) = self.retry.backoff_multiplier {
            if !m.is_finite() || m < 1.0 {
                return invalid("retry.backoff_multiplier", "must be a finite number >= 1");
            }
        }
        if let Some(base) = &self.base_url {
            if url::Url::parse(base).is_err() {
                return invalid("base_url", "must be an absolute URL");
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache.enabled,
            ttl: Duration::from_millis(self.cache.ttl_ms),
            key: None,
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        let config = RetryConfig::new()
            .with_enabled(self.retry.enabled)
            .with_max_retries(self.retry.max_retries)
            .with_delay(Duration::from_millis(self.retry.delay_ms));
        match self.retry.backoff_multiplier {
            Some(multiplier) => {
                let max_delay = self
                    .retry
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(30));
                config.with_exponential_backoff(multiplier, max_delay)
            }
            None => config,
        }
    }

    pub fn debounce_config(&self) -> DebounceConfig {
        DebounceConfig {
            enabled: self.debounce.enabled,
            delay: Duration::from_millis(self.debounce.delay_ms),
        }
    }

    pub fn timeout_policy(&self) -> TimeoutPolicy {
        TimeoutPolicy {
            default: Duration::from_millis(self.timeouts.default_ms),
            long: Duration::from_millis(self.timeouts.long_ms),
            long_running_paths: self.timeouts.long_running_paths.clone(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.cache.sweep_interval_ms)
    }

    /// A request builder pre-populated with this config's defaults.
    pub fn request(&self, url: impl Into<String>) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(url)
            .cache(self.cache_config())
            .retry(self.retry_config())
            .debounce(self.debounce_config())
    }
}

fn env_secs_as_ms(name: &str) -> Option<u64> {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(|secs| secs.saturating_mul(1000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::retry::Backoff;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ClientConfig::default();
        let cache = config.cache_config();
        assert!(!cache.enabled);
        assert_eq!(cache.ttl, Duration::from_millis(300_000));

        let retry = config.retry_config();
        assert!(!retry.enabled);
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.delay, Duration::from_millis(1000));
        assert_eq!(retry.backoff, Backoff::Fixed);

        let debounce = config.debounce_config();
        assert!(!debounce.enabled);
        assert_eq!(debounce.delay, Duration::from_millis(300));

        assert_eq!(config.timeout_policy(), TimeoutPolicy::default());
    }

    #[test]
    fn test_yaml_partial_sections() {
        let config = ClientConfig::from_yaml_str(
            r#"
base_url: "http://localhost:3001"
retry:
  enabled: true
  delay_ms: 250
  backoff_multiplier: 2.0
  max_delay_ms: 2000
debounce:
  enabled: true
"#,
        )
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3001"));
        let retry = config.retry_config();
        assert!(retry.enabled);
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.delay, Duration::from_millis(250));
        assert_eq!(
            retry.backoff,
            Backoff::Exponential {
                multiplier: 2.0,
                max_delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(config.debounce_config().delay, Duration::from_millis(300));
    }

    #[test]
    fn test_json_config() {
        let config =
            ClientConfig::from_json_str(r#"{"cache": {"enabled": true, "ttl_ms": 5000}}"#)
                .unwrap();
        assert!(config.cache_config().enabled);
        assert_eq!(config.cache_config().ttl, Duration::from_millis(5000));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = ClientConfig::from_yaml_str("cache:\n  ttl: 5\n").unwrap_err();
        assert!(matches!(err, Error::Yaml(_)));
    }

    #[test]
    fn test_validation_errors_carry_field_path() {
        let err = ClientConfig::from_yaml_str("retry:\n  backoff_multiplier: 0.5\n").unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("retry.backoff_multiplier")
        );

        let err = ClientConfig::from_yaml_str("base_url: \"/relative\"\n").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn test_request_builder_inherits_defaults() {
        let config = ClientConfig::from_yaml_str("cache:\n  enabled: true\n").unwrap();
        let options = config.request("/api/services").build().unwrap();
        assert!(options.cache().enabled);
        assert!(!options.retry().enabled);
    }
}
