use super::execution::{AttemptRecord, CacheMode, RequestExecutor};
use super::options::{RequestOptions, RequestOverrides};
use super::state::{ClientState, FetchOutcome};
use crate::cache::{CacheKey, CacheStore};
use crate::resilience::cancel::ScopeKey;
use crate::resilience::debounce::DebounceCoordinator;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// The handle UI code holds for one data source.
///
/// Owns its `{data, loading, error}` state and shares only the cache store
/// with other clients. Starting a call while another is in flight supersedes
/// the older one: its result is discarded and its transport call is asked to
/// abort.
pub struct FetchClient<T> {
    base: RequestOptions,
    executor: Arc<RequestExecutor<T>>,
    debouncer: DebounceCoordinator<FetchOutcome<T>>,
    debounce_key: String,
    closed: AtomicBool,
}

impl<T> FetchClient<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(base: RequestOptions, executor: RequestExecutor<T>) -> Self {
        let debounce_key = format!("client-{}", executor.scope_key());
        Self {
            base,
            executor: Arc::new(executor),
            debouncer: DebounceCoordinator::new(),
            debounce_key,
            closed: AtomicBool::new(false),
        }
    }

    /// Run the base request.
    pub async fn execute(&self) -> Result<FetchOutcome<T>> {
        self.execute_with(RequestOverrides::default()).await
    }

    /// Run the base request with `overrides` applied for this call only.
    ///
    /// Returns `Err` only for an invalid request or a closed client; network
    /// failures come back as [`FetchOutcome::Failed`] and are also published
    /// to the state.
    pub async fn execute_with(&self, overrides: RequestOverrides) -> Result<FetchOutcome<T>> {
        let options = self.base.merge(&overrides);
        self.executor.validate(&options)?;
        self.dispatch(options, CacheMode::Use).await
    }

    /// Like [`execute`](Self::execute) but never answered from cache. A
    /// successful reply still refreshes the cache when caching is enabled.
    ///
    /// With debounce enabled a refetch joins the same quiet period as
    /// `execute`: if it is the last call of a burst, its base request runs
    /// and every coalesced caller, including earlier `execute_with` calls
    /// with other overrides, receives the refetched result.
    pub async fn refetch(&self) -> Result<FetchOutcome<T>> {
        let options = self.base.clone();
        self.executor.validate(&options)?;
        self.dispatch(options, CacheMode::Refresh).await
    }

    async fn dispatch(&self, options: RequestOptions, mode: CacheMode) -> Result<FetchOutcome<T>> {
        if self.is_closed() {
            return Err(Error::Cancelled);
        }
        if !options.debounce().enabled {
            return Ok(self.executor.run(options, mode).await);
        }

        let delay = options.debounce().delay;
        let executor = Arc::clone(&self.executor);
        let pending = self
            .debouncer
            .schedule(self.debounce_key.clone(), delay, move || async move {
                executor.run(options, mode).await
            });
        match pending.await {
            Ok(outcome) => Ok(outcome),
            Err(Error::Cancelled) => Ok(FetchOutcome::Superseded),
            Err(e) => Err(e),
        }
    }

    /// Remove `key`, or this client's own key, from the cache. Returns
    /// whether an entry was removed.
    pub fn clear_cache(&self, key: Option<&str>) -> bool {
        let key = match key {
            Some(key) => CacheKey::from(key),
            None => self.base.cache_key(),
        };
        let removed = self.executor.store().delete(&key);
        debug!(cache_key = key.as_str(), removed, "resilient-fetch cache cleared");
        removed
    }

    pub fn clear_error(&self) {
        self.executor.clear_error();
    }

    pub fn state(&self) -> ClientState<T> {
        self.executor.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState<T>> {
        self.executor.subscribe()
    }

    /// Attempts made by the most recent call that published.
    pub fn last_attempts(&self) -> Vec<AttemptRecord> {
        self.executor.last_attempts()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.base
    }

    pub fn cache_key(&self) -> CacheKey {
        self.base.cache_key()
    }

    pub fn cache_store(&self) -> &Arc<CacheStore> {
        self.executor.store()
    }

    pub fn id(&self) -> ScopeKey {
        self.executor.scope_key()
    }

    /// Cancel the in-flight call and any pending debounce timer. Later calls
    /// fail with [`Error::Cancelled`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.debouncer.shutdown();
        let cancelled = self.executor.cancel_in_flight();
        debug!(client = self.id(), cancelled, "resilient-fetch client closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<T> Drop for FetchClient<T> {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.executor.cancel_in_flight();
        }
    }
}
