//! 请求选项：不可变的请求描述与缓存/重试/防抖配置。
//!
//! Request options: the immutable value every call executes from.

use crate::cache::CacheKey;
use crate::resilience::debounce::DebounceConfig;
use crate::resilience::retry::RetryConfig;
use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// What goes on the wire for one logical call. Immutable once an attempt starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub params: Option<BTreeMap<String, Value>>,
    pub body: Option<Value>,
    /// Explicit per-request timeout. `None` lets the client's timeout policy decide.
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: BTreeMap::new(),
            params: None,
            body: None,
            timeout: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::validation_with_context(
                "request URL is required",
                ErrorContext::new()
                    .with_field_path("request.url")
                    .with_source("request_validator"),
            ));
        }
        if self.url.chars().any(char::is_whitespace) {
            return Err(Error::validation_with_context(
                "request URL must not contain whitespace",
                ErrorContext::new()
                    .with_field_path("request.url")
                    .with_details(format!("got {:?}", self.url))
                    .with_source("request_validator"),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::validation_with_context(
                "request timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("request.timeout")
                    .with_source("request_validator"),
            ));
        }
        Ok(())
    }
}

/// Cache behaviour for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl: Duration,
    /// Replaces the derived key when set.
    pub key: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_millis(300_000),
            key: None,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled config with the given freshness window.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            key: None,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A fully resolved request plus its cache, retry and debounce settings.
///
/// Built with [`RequestOptionsBuilder`]; per-call changes are applied with
/// [`RequestOptions::merge`], which returns a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    descriptor: RequestDescriptor,
    cache: CacheConfig,
    retry: RetryConfig,
    debounce: DebounceConfig,
}

impl RequestOptions {
    pub fn builder(url: impl Into<String>) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(url)
    }

    /// GET with a 5 minute cache.
    pub fn cached_get(
        url: impl Into<String>,
        params: BTreeMap<String, Value>,
    ) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(url)
            .params(params)
            .cache(CacheConfig::with_ttl(Duration::from_secs(5 * 60)))
    }

    /// POST retried up to 3 times, 1 s apart.
    pub fn post_with_retry(url: impl Into<String>) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(url)
            .method(Method::POST)
            .retry(RetryConfig::fixed(3, Duration::from_millis(1000)))
    }

    /// Search-as-you-type: 300 ms debounce, 2 minute cache.
    pub fn debounced_search(
        url: impl Into<String>,
        params: BTreeMap<String, Value>,
    ) -> RequestOptionsBuilder {
        RequestOptionsBuilder::new(url)
            .params(params)
            .debounce(DebounceConfig::with_delay(Duration::from_millis(300)))
            .cache(CacheConfig::with_ttl(Duration::from_secs(2 * 60)))
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn url(&self) -> &str {
        &self.descriptor.url
    }

    pub fn method(&self) -> &Method {
        &self.descriptor.method
    }

    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn debounce(&self) -> &DebounceConfig {
        &self.debounce
    }

    /// The explicit key override if one is set, otherwise the derived key.
    pub fn cache_key(&self) -> CacheKey {
        match &self.cache.key {
            Some(key) => CacheKey::new(key.clone()),
            None => CacheKey::derive(
                self.descriptor.method.as_str(),
                &self.descriptor.url,
                self.descriptor.params.as_ref(),
                self.descriptor.body.as_ref(),
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.descriptor.validate()?;
        if self.cache.enabled && self.cache.ttl.is_zero() {
            return Err(Error::validation_with_context(
                "cache TTL must be greater than zero when caching is enabled",
                ErrorContext::new()
                    .with_field_path("cache.ttl")
                    .with_source("request_validator"),
            ));
        }
        if let Some(key) = &self.cache.key {
            if key.is_empty() {
                return Err(Error::validation_with_context(
                    "cache key override must not be empty",
                    ErrorContext::new()
                        .with_field_path("cache.key")
                        .with_source("request_validator"),
                ));
            }
        }
        Ok(())
    }

    /// Overlay `overrides` onto these options.
    ///
    /// Set fields replace; headers are merged key by key. The result is not
    /// validated here.
    pub fn merge(&self, overrides: &RequestOverrides) -> RequestOptions {
        let mut merged = self.clone();
        let d = &mut merged.descriptor;
        if let Some(url) = &overrides.url {
            d.url = url.clone();
        }
        if let Some(method) = &overrides.method {
            d.method = method.clone();
        }
        d.headers.extend(
            overrides
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(params) = &overrides.params {
            d.params = Some(params.clone());
        }
        if let Some(body) = &overrides.body {
            d.body = Some(body.clone());
        }
        if let Some(timeout) = overrides.timeout {
            d.timeout = Some(timeout);
        }
        if let Some(cache) = &overrides.cache {
            merged.cache = cache.clone();
        }
        if let Some(retry) = &overrides.retry {
            merged.retry = retry.clone();
        }
        if let Some(debounce) = &overrides.debounce {
            merged.debounce = debounce.clone();
        }
        merged
    }
}

/// Builder for [`RequestOptions`].
///
/// Defaults: caching off with a 5 minute TTL, retries off (3 × 1000 ms when
/// enabled), debounce off (300 ms when enabled), GET, no timeout override.
#[derive(Debug, Clone)]
pub struct RequestOptionsBuilder {
    descriptor: RequestDescriptor,
    cache: CacheConfig,
    retry: RetryConfig,
    debounce: DebounceConfig,
}

impl RequestOptionsBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            descriptor: RequestDescriptor::new(url),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            debounce: DebounceConfig::default(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.descriptor.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor.headers.insert(name.into(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.descriptor
            .params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.descriptor.params = Some(params);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.descriptor.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Enable caching with the given TTL.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.enabled = true;
        self.cache.ttl = ttl;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache.key = Some(key.into());
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn debounce(mut self, debounce: DebounceConfig) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn build(self) -> Result<RequestOptions> {
        let options = RequestOptions {
            descriptor: self.descriptor,
            cache: self.cache,
            retry: self.retry,
            debounce: self.debounce,
        };
        options.validate()?;
        Ok(options)
    }
}

/// Per-call changes layered over a client's base options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    pub url: Option<String>,
    pub method: Option<Method>,
    pub headers: BTreeMap<String, String>,
    pub params: Option<BTreeMap<String, Value>>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub cache: Option<CacheConfig>,
    pub retry: Option<RetryConfig>,
    pub debounce: Option<DebounceConfig>,
}

impl RequestOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add one query parameter. The resulting map replaces the base params.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn params(mut self, params: BTreeMap<String, Value>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn debounce(mut self, debounce: DebounceConfig) -> Self {
        self.debounce = Some(debounce);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_defaults() {
        let options = RequestOptions::builder("/api/services").build().unwrap();
        assert_eq!(options.method(), &Method::GET);
        assert_eq!(options.cache(), &CacheConfig::default());
        assert_eq!(options.cache().ttl, Duration::from_millis(300_000));
        assert_eq!(options.retry(), &RetryConfig::default());
        assert_eq!(options.debounce(), &DebounceConfig::default());
        assert_eq!(options.descriptor().timeout, None);
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let err = RequestOptions::builder("  ").build().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("request.url")
        );
    }

    #[test]
    fn test_zero_ttl_with_cache_is_rejected() {
        let err = RequestOptions::builder("/x")
            .cache_ttl(Duration::ZERO)
            .build()
            .unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("cache.ttl")
        );
    }

    #[test]
    fn test_merge_replaces_and_extends() {
        let base = RequestOptions::builder("/api/search")
            .header("accept", "application/json")
            .param("q", "a")
            .param("page", 1)
            .build()
            .unwrap();

        let merged = base.merge(
            &RequestOverrides::new()
                .param("q", "abc")
                .header("x-trace", "1")
                .retry(RetryConfig::fixed(2, Duration::from_millis(5))),
        );

        let params = merged.descriptor().params.as_ref().unwrap();
        assert_eq!(params.get("q"), Some(&json!("abc")));
        assert!(!params.contains_key("page"));
        assert_eq!(merged.descriptor().headers.len(), 2);
        assert!(merged.retry().enabled);
        // base untouched
        assert_eq!(
            base.descriptor().params.as_ref().unwrap().get("q"),
            Some(&json!("a"))
        );
    }

    #[test]
    fn test_cache_key_follows_inputs_or_override() {
        let a = RequestOptions::builder("/x").param("q", "a").build().unwrap();
        let b = RequestOptions::builder("/x").param("q", "a").build().unwrap();
        let c = RequestOptions::builder("/x").param("q", "b").build().unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());

        let pinned = RequestOptions::builder("/x")
            .cache_key("services")
            .build()
            .unwrap();
        assert_eq!(pinned.cache_key().as_str(), "services");
    }

    #[test]
    fn test_presets() {
        let cached = RequestOptions::cached_get("/api/services", BTreeMap::new())
            .build()
            .unwrap();
        assert!(cached.cache().enabled);
        assert_eq!(cached.cache().ttl, Duration::from_secs(300));

        let post = RequestOptions::post_with_retry("/api/orders").build().unwrap();
        assert_eq!(post.method(), &Method::POST);
        assert_eq!(post.retry(), &RetryConfig::fixed(3, Duration::from_millis(1000)));

        let search = RequestOptions::debounced_search("/api/search", BTreeMap::new())
            .build()
            .unwrap();
        assert!(search.debounce().enabled);
        assert_eq!(search.debounce().delay, Duration::from_millis(300));
        assert_eq!(search.cache().ttl, Duration::from_secs(120));
    }
}
