use super::callbacks::Callbacks;
use super::core::FetchClient;
use super::error_classification::ClassifiedError;
use super::execution::RequestExecutor;
use super::options::RequestOptions;
use crate::cache::CacheStore;
use crate::config::{ClientConfig, TimeoutPolicy};
use crate::resilience::cancel::{next_scope_key, CancellationScope};
use crate::transport::{HttpTransport, Transport};
use crate::Result;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`FetchClient`].
///
/// Anything not supplied gets a default: an [`HttpTransport`] configured from
/// the environment, a private [`CacheStore`], a private cancellation scope and
/// [`TimeoutPolicy::from_env`]. Hand the same `Arc<CacheStore>` to every
/// client that should share cached responses.
pub struct ClientBuilder<T> {
    options: RequestOptions,
    transport: Option<Arc<dyn Transport>>,
    cache_store: Option<Arc<CacheStore>>,
    sweep_interval: Option<Duration>,
    scope: Option<Arc<CancellationScope>>,
    timeouts: Option<TimeoutPolicy>,
    callbacks: Callbacks<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ClientBuilder<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(options: RequestOptions) -> Self {
        Self {
            options,
            transport: None,
            cache_store: None,
            sweep_interval: None,
            scope: None,
            timeouts: None,
            callbacks: Callbacks::default(),
            _marker: PhantomData,
        }
    }

    /// Seed a builder from a loaded [`ClientConfig`]: its request defaults,
    /// timeout policy, sweep interval and base URL.
    pub fn from_config(config: &ClientConfig, url: impl Into<String>) -> Result<Self> {
        let options = config.request(url).build()?;
        let transport = HttpTransport::with_base_url(config.base_url.as_deref())?;
        Ok(Self::new(options)
            .transport(Arc::new(transport))
            .sweep_interval(config.sweep_interval())
            .timeout_policy(config.timeout_policy()))
    }

    /// Replace the base request options.
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Inject a store. Its sweep is the caller's to start.
    pub fn cache_store(mut self, store: Arc<CacheStore>) -> Self {
        self.cache_store = Some(store);
        self
    }

    /// Sweep interval of the private store created when none is injected.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Share a cancellation scope with other clients. Each client still
    /// supersedes only its own calls.
    pub fn cancellation_scope(mut self, scope: Arc<CancellationScope>) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeouts = Some(policy);
        self
    }

    pub fn on_success(mut self, hook: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.callbacks.on_success = Some(Arc::new(hook));
        self
    }

    pub fn on_error(mut self, hook: impl Fn(&ClassifiedError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(hook));
        self
    }

    pub fn on_finally(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks.on_finally = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<FetchClient<T>> {
        self.options.validate()?;
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()?),
        };
        transport.validate(self.options.descriptor())?;
        let store = match self.cache_store {
            Some(store) => store,
            None => {
                let interval = self
                    .sweep_interval
                    .unwrap_or(CacheStore::DEFAULT_SWEEP_INTERVAL);
                let store = Arc::new(CacheStore::with_sweep_interval(interval));
                // A private store has nobody else to start its sweep.
                if tokio::runtime::Handle::try_current().is_ok() {
                    store.start();
                }
                store
            }
        };
        let executor = RequestExecutor::new(
            next_scope_key(),
            transport,
            store,
            self.scope
                .unwrap_or_else(|| Arc::new(CancellationScope::new())),
            self.timeouts.unwrap_or_else(TimeoutPolicy::from_env),
            self.callbacks,
        );
        Ok(FetchClient::from_parts(self.options, executor))
    }
}

impl<T> FetchClient<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn builder(options: RequestOptions) -> ClientBuilder<T> {
        ClientBuilder::new(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use serde_json::Value;

    #[tokio::test]
    async fn test_from_config_starts_private_sweep() {
        let mut config = ClientConfig::default();
        config.cache.sweep_interval_ms = 90_000;

        let client = ClientBuilder::<Value>::from_config(&config, "http://localhost/api/services")
            .unwrap()
            .build()
            .unwrap();
        assert!(client.cache_store().is_running());
        assert_eq!(
            client.cache_store().sweep_interval(),
            Duration::from_secs(90)
        );
    }

    #[tokio::test]
    async fn test_injected_store_is_left_alone() {
        let store = CacheStore::shared();
        let client = ClientBuilder::<Value>::from_config(
            &ClientConfig::default(),
            "http://localhost/api/services",
        )
        .unwrap()
        .cache_store(Arc::clone(&store))
        .build()
        .unwrap();
        assert!(Arc::ptr_eq(client.cache_store(), &store));
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn test_build_rejects_url_the_transport_cannot_send() {
        let config = ClientConfig::default();
        let builder = ClientBuilder::<Value>::from_config(&config, "/api/services").unwrap();
        let err = builder.build().err().unwrap();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
