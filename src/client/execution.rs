//! 请求执行逻辑：缓存查询、重试循环、取消与状态发布。
//!
//! Request execution logic (one logical call).
//!
//! A call either resolves from cache without touching the network, or runs an
//! attempt loop under a fresh cancellation token. Every state publication
//! happens inside the state channel's lock and re-checks the token there, so
//! a call that has been superseded can never overwrite what a newer call
//! published. Lock order is state, then cache store.

use super::callbacks::Callbacks;
use super::error_classification::{ClassifiedError, ErrorClass};
use super::options::RequestOptions;
use super::state::{ClientState, FetchOutcome};
use crate::cache::{CacheKey, CacheStore};
use crate::config::TimeoutPolicy;
use crate::resilience::cancel::{AttemptToken, CancellationScope, ScopeKey};
use crate::resilience::retry::{Decision, RetryPolicy};
use crate::transport::{Transport, TransportError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Whether a call may be answered from cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Read the cache first (when caching is enabled).
    Use,
    /// Skip the read; still write on success when caching is enabled.
    Refresh,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success { status: u16 },
    Failed { class: ErrorClass, status: Option<u16> },
}

/// One transport invocation within a call's retry loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    /// 0-based.
    pub attempt_number: u32,
    pub started_at: Instant,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

pub struct RequestExecutor<T> {
    scope_key: ScopeKey,
    transport: Arc<dyn Transport>,
    store: Arc<CacheStore>,
    scope: Arc<CancellationScope>,
    timeouts: TimeoutPolicy,
    state: watch::Sender<ClientState<T>>,
    callbacks: Callbacks<T>,
    history: Mutex<Vec<AttemptRecord>>,
}

impl<T> RequestExecutor<T> {
    pub fn scope_key(&self) -> ScopeKey {
        self.scope_key
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Check `options` and ask the transport whether it can send them at all.
    pub fn validate(&self, options: &RequestOptions) -> crate::Result<()> {
        options.validate()?;
        self.transport.validate(options.descriptor())
    }

    /// Cancel whatever this executor has in flight.
    pub fn cancel_in_flight(&self) -> bool {
        self.scope.cancel_previous(self.scope_key)
    }

    fn history(&self) -> MutexGuard<'_, Vec<AttemptRecord>> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> RequestExecutor<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        scope_key: ScopeKey,
        transport: Arc<dyn Transport>,
        store: Arc<CacheStore>,
        scope: Arc<CancellationScope>,
        timeouts: TimeoutPolicy,
        callbacks: Callbacks<T>,
    ) -> Self {
        let (state, _) = watch::channel(ClientState::default());
        Self {
            scope_key,
            transport,
            store,
            scope,
            timeouts,
            state,
            callbacks,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ClientState<T> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientState<T>> {
        self.state.subscribe()
    }

    pub fn last_attempts(&self) -> Vec<AttemptRecord> {
        self.history().clone()
    }

    /// Clear the published error, leaving `data` and `loading` alone.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| state.error.take().is_some());
    }

    /// Run one logical call to completion.
    pub async fn run(&self, options: RequestOptions, mode: CacheMode) -> FetchOutcome<T> {
        let cache = options.cache();
        let key = options.cache_key();

        if cache.enabled && mode == CacheMode::Use {
            if let Some(data) = self.resolve_from_cache(&key) {
                self.callbacks.succeeded(&data);
                return FetchOutcome::Data(data);
            }
        }

        let token = {
            let mut issued = None;
            self.state.send_modify(|state| {
                issued = Some(self.scope.begin(self.scope_key));
                state.loading = true;
                state.error = None;
            });
            match issued {
                Some(token) => token,
                None => return FetchOutcome::Superseded,
            }
        };

        let (result, records) = self.attempt_loop(&options, &token).await;
        let attempts = records.len() as u32;
        let write_ttl = cache.enabled.then_some(cache.ttl);

        let outcome = match result {
            Ok((data, raw)) => {
                let published = self.publish(&token, records, |state| {
                    if let Some(ttl) = write_ttl {
                        self.store.set(key.clone(), raw, ttl);
                        debug!(
                            cache_key = key.as_str(),
                            ttl_ms = ttl.as_millis(),
                            "resilient-fetch cache write"
                        );
                    }
                    state.data = Some(data.clone());
                    state.error = None;
                });
                if published {
                    self.callbacks.succeeded(&data);
                    FetchOutcome::Data(data)
                } else {
                    FetchOutcome::Superseded
                }
            }
            Err(err) if err.is_cancellation() => {
                // The transport gave up on its own; drop the loading flag but
                // leave data/error as they were before the call.
                self.publish(&token, records, |_| {});
                FetchOutcome::Superseded
            }
            Err(err) => {
                let classified = ClassifiedError::from_transport(&err, attempts);
                let published = self.publish(&token, records, |state| {
                    state.data = None;
                    state.error = Some(classified.clone());
                });
                if published {
                    warn!(
                        url = options.url(),
                        error_class = classified.class.as_str(),
                        http_status = classified.status.unwrap_or(0),
                        attempts,
                        "resilient-fetch request failed"
                    );
                    self.callbacks.failed(&classified);
                    FetchOutcome::Failed(classified)
                } else {
                    FetchOutcome::Superseded
                }
            }
        };

        self.scope.finish(&token);
        if outcome.is_superseded() {
            debug!(
                url = options.url(),
                generation = token.generation(),
                "resilient-fetch discarded superseded result"
            );
        }
        outcome
    }

    /// Serve a fresh cache entry. The lookup and the publish happen under the
    /// state lock, and a hit supersedes whatever this client had in flight.
    fn resolve_from_cache(&self, key: &CacheKey) -> Option<T> {
        let mut hit = None;
        self.state.send_if_modified(|state| {
            let entry = match self.store.get(key) {
                Some(entry) => entry,
                None => {
                    debug!(cache_key = key.as_str(), "resilient-fetch cache miss");
                    return false;
                }
            };
            match serde_json::from_value::<T>(entry.into_value()) {
                Ok(data) => {
                    self.scope.cancel_previous(self.scope_key);
                    state.data = Some(data.clone());
                    state.error = None;
                    state.loading = false;
                    hit = Some(data);
                    true
                }
                Err(e) => {
                    warn!(
                        cache_key = key.as_str(),
                        error = %e,
                        "resilient-fetch dropping undecodable cache entry"
                    );
                    self.store.delete(key);
                    false
                }
            }
        });
        if hit.is_some() {
            debug!(cache_key = key.as_str(), "resilient-fetch cache hit");
            self.history().clear();
        }
        hit
    }

    /// Apply `update` and clear `loading`, unless `token` was superseded.
    fn publish(
        &self,
        token: &AttemptToken,
        records: Vec<AttemptRecord>,
        update: impl FnOnce(&mut ClientState<T>),
    ) -> bool {
        self.state.send_if_modified(|state| {
            if token.is_cancelled() {
                return false;
            }
            update(state);
            state.loading = false;
            *self.history() = records;
            true
        })
    }

    async fn attempt_loop(
        &self,
        options: &RequestOptions,
        token: &AttemptToken,
    ) -> (Result<(T, Value), TransportError>, Vec<AttemptRecord>) {
        let policy = RetryPolicy::new(options.retry().clone());
        let mut descriptor = options.descriptor().clone();
        if descriptor.timeout.is_none() {
            descriptor.timeout = Some(self.timeouts.timeout_for(&descriptor.url));
        }

        let mut records = Vec::new();
        let mut attempt: u32 = 0;
        loop {
            if token.is_cancelled() {
                return (Err(TransportError::Cancelled), records);
            }

            let started_at = Instant::now();
            debug!(
                url = descriptor.url.as_str(),
                method = descriptor.method.as_str(),
                attempt,
                transport = self.transport.name(),
                "resilient-fetch attempt started"
            );
            let result = self
                .transport
                .send(&descriptor, token.token())
                .await
                .and_then(|response| {
                    let status = response.status;
                    serde_json::from_value::<T>(response.body.clone())
                        .map(|data| (data, response.body, status))
                        .map_err(|e| TransportError::Decode(e.to_string()))
                });
            let elapsed = started_at.elapsed();

            let err = match result {
                Ok((data, raw, status)) => {
                    records.push(AttemptRecord {
                        attempt_number: attempt,
                        started_at,
                        elapsed,
                        outcome: AttemptOutcome::Success { status },
                    });
                    info!(
                        url = descriptor.url.as_str(),
                        http_status = status,
                        attempt,
                        duration_ms = elapsed.as_millis(),
                        "resilient-fetch request succeeded"
                    );
                    return (Ok((data, raw)), records);
                }
                Err(err) => err,
            };

            let class = ErrorClass::of(&err);
            records.push(AttemptRecord {
                attempt_number: attempt,
                started_at,
                elapsed,
                outcome: AttemptOutcome::Failed {
                    class,
                    status: err.status(),
                },
            });
            if token.is_cancelled() {
                return (Err(TransportError::Cancelled), records);
            }
            info!(
                url = descriptor.url.as_str(),
                error_class = class.as_str(),
                http_status = err.status().unwrap_or(0),
                attempt,
                duration_ms = elapsed.as_millis(),
                "resilient-fetch attempt failed"
            );

            match policy.decide(class, attempt) {
                Decision::Retry { delay } => {
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        "resilient-fetch retry scheduled"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => {
                            return (Err(TransportError::Cancelled), records);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Decision::Fail => return (Err(err), records),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::options::RequestDescriptor;
    use crate::resilience::cancel::next_scope_key;
    use crate::resilience::retry::RetryConfig;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use tokio_util::sync::CancellationToken;

    struct Scripted {
        replies: Mutex<VecDeque<std::result::Result<Value, TransportError>>>,
        calls: Mutex<Vec<RequestDescriptor>>,
    }

    impl Scripted {
        fn new(replies: Vec<std::result::Result<Value, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<RequestDescriptor> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(
            &self,
            request: &RequestDescriptor,
            _cancel: &CancellationToken,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(json!(null)));
            reply.map(TransportResponse::ok)
        }
    }

    fn executor<T>(transport: Arc<Scripted>) -> RequestExecutor<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        RequestExecutor::new(
            next_scope_key(),
            transport,
            CacheStore::shared(),
            Arc::new(CancellationScope::new()),
            TimeoutPolicy::default(),
            Callbacks::default(),
        )
    }

    fn http(status: u16) -> TransportError {
        TransportError::Http {
            status,
            message: String::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_with_fixed_gaps() {
        let transport = Scripted::new(vec![Err(http(500)), Err(http(500)), Ok(json!("ok"))]);
        let exec: RequestExecutor<String> = executor(Arc::clone(&transport));
        let options = RequestOptions::builder("/api/x")
            .retry(RetryConfig::fixed(3, Duration::from_millis(1000)))
            .build()
            .unwrap();

        let start = Instant::now();
        let outcome = exec.run(options, CacheMode::Use).await;
        assert_eq!(outcome, FetchOutcome::Data("ok".to_string()));
        assert!(start.elapsed() >= Duration::from_millis(2000));

        let records = exec.last_attempts();
        assert_eq!(records.len(), 3);
        for pair in records.windows(2) {
            assert!(pair[1].started_at - pair[0].started_at >= Duration::from_millis(1000));
        }
        assert_eq!(exec.state().data.as_deref(), Some("ok"));
        assert!(!exec.state().loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let transport = Scripted::new(vec![Err(http(404))]);
        let exec: RequestExecutor<Value> = executor(Arc::clone(&transport));
        let options = RequestOptions::builder("/api/missing")
            .retry(RetryConfig::fixed(3, Duration::from_millis(10)))
            .build()
            .unwrap();

        let outcome = exec.run(options, CacheMode::Use).await;
        let err = outcome.error().cloned().unwrap();
        assert_eq!(err.class, ErrorClass::HttpClient);
        assert_eq!(err.attempts, 1);
        assert_eq!(transport.calls().len(), 1);
        assert_eq!(exec.state().error, Some(err));
        assert_eq!(exec.state().data, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_is_terminal_and_not_cached() {
        let transport = Scripted::new(vec![Ok(json!({"unexpected": true}))]);
        let exec: RequestExecutor<Vec<String>> = executor(Arc::clone(&transport));
        let options = RequestOptions::builder("/api/list")
            .cache_ttl(Duration::from_secs(60))
            .retry(RetryConfig::fixed(3, Duration::from_millis(10)))
            .build()
            .unwrap();
        let key = options.cache_key();

        let outcome = exec.run(options, CacheMode::Use).await;
        assert_eq!(outcome.error().map(|e| e.class), Some(ErrorClass::Decode));
        assert_eq!(transport.calls().len(), 1);
        assert!(exec.store().get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_skips_read_but_writes() {
        let transport = Scripted::new(vec![Ok(json!(1)), Ok(json!(2))]);
        let exec: RequestExecutor<u32> = executor(Arc::clone(&transport));
        let options = RequestOptions::builder("/api/n")
            .cache_ttl(Duration::from_secs(60))
            .build()
            .unwrap();

        assert_eq!(exec.run(options.clone(), CacheMode::Use).await.into_data(), Some(1));
        assert_eq!(exec.run(options.clone(), CacheMode::Use).await.into_data(), Some(1));
        assert_eq!(transport.calls().len(), 1);

        assert_eq!(exec.run(options.clone(), CacheMode::Refresh).await.into_data(), Some(2));
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(exec.run(options, CacheMode::Use).await.into_data(), Some(2));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_policy_fills_descriptor() {
        let transport = Scripted::new(vec![Ok(json!(null)), Ok(json!(null)), Ok(json!(null))]);
        let exec: RequestExecutor<Value> = executor(Arc::clone(&transport));

        for url in ["/api/ia/analyse", "/api/services"] {
            let options = RequestOptions::builder(url).build().unwrap();
            exec.run(options, CacheMode::Use).await;
        }
        let explicit = RequestOptions::builder("/api/ia/x")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        exec.run(explicit, CacheMode::Use).await;

        let timeouts: Vec<_> = transport.calls().iter().map(|c| c.timeout).collect();
        assert_eq!(
            timeouts,
            vec![
                Some(Duration::from_secs(60)),
                Some(Duration::from_secs(30)),
                Some(Duration::from_secs(5))
            ]
        );
    }
}
