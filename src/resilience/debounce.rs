//! Debounce coordinator
//!
//! One small state machine per debounce key: `{pending timer, generation,
//! waiters}`. Every `schedule` call restarts the timer and joins the waiter
//! list; when a quiet period finally elapses, the most recently scheduled work
//! runs once and every waiter of the burst receives its result.

use crate::{Error, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

/// Configuration for call coalescing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceConfig {
    pub enabled: bool,
    /// Quiet period that must elapse before the work runs.
    pub delay: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay: Duration::from_millis(300),
        }
    }
}

impl DebounceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enabled config with the given quiet period.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            enabled: true,
            delay,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

struct Slot<R> {
    generation: u64,
    timer: JoinHandle<()>,
    waiters: Vec<oneshot::Sender<R>>,
}

struct Inner<R> {
    slots: HashMap<String, Slot<R>>,
    next_generation: u64,
    closed: bool,
}

/// Collapses bursts of calls per key into a single execution.
///
/// Dropping the coordinator tears it down: pending timers are cancelled and
/// their waiters resolve with [`Error::Cancelled`].
pub struct DebounceCoordinator<R> {
    inner: Arc<Mutex<Inner<R>>>,
}

impl<R> Default for DebounceCoordinator<R>
where
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<R>(inner: &Mutex<Inner<R>>) -> MutexGuard<'_, Inner<R>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R> DebounceCoordinator<R>
where
    R: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                slots: HashMap::new(),
                next_generation: 0,
                closed: false,
            })),
        }
    }

    /// Schedule `work` to run after `delay` of quiet on `key`.
    ///
    /// Registration happens synchronously, before the returned future is
    /// polled, so call order is the order the calls were made. Must be called
    /// from within a tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        key: impl Into<String>,
        delay: Duration,
        work: F,
    ) -> impl Future<Output = Result<R>> + Send + 'static
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let key = key.into();
        let deadline = Instant::now() + delay;
        let (tx, rx) = oneshot::channel();
        let work: Box<dyn FnOnce() -> BoxFuture<'static, R> + Send> =
            Box::new(move || Box::pin(work()));

        {
            let mut inner = lock(&self.inner);
            if inner.closed {
                drop(tx);
            } else {
                inner.next_generation += 1;
                let generation = inner.next_generation;

                let mut waiters = match inner.slots.remove(&key) {
                    Some(prev) => {
                        prev.timer.abort();
                        debug!(
                            key = key.as_str(),
                            coalesced = prev.waiters.len(),
                            "resilient-fetch debounce timer restarted"
                        );
                        prev.waiters
                    }
                    None => Vec::new(),
                };
                waiters.push(tx);

                let timer = tokio::spawn(fire(
                    Arc::clone(&self.inner),
                    key.clone(),
                    generation,
                    deadline,
                    work,
                ));
                inner.slots.insert(
                    key,
                    Slot {
                        generation,
                        timer,
                        waiters,
                    },
                );
            }
        }

        async move { rx.await.map_err(|_| Error::Cancelled) }
    }

    /// Whether a timer is pending for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        lock(&self.inner).slots.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.inner).slots.len()
    }

    /// Cancel the pending timer for `key`; its waiters resolve with `Error::Cancelled`.
    pub fn cancel(&self, key: &str) -> bool {
        match lock(&self.inner).slots.remove(key) {
            Some(slot) => {
                slot.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer and refuse further scheduling.
    pub fn shutdown(&self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        for (_, slot) in inner.slots.drain() {
            slot.timer.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        lock(&self.inner).closed
    }
}

impl<R> Drop for DebounceCoordinator<R> {
    fn drop(&mut self) {
        let mut inner = lock(&self.inner);
        inner.closed = true;
        for (_, slot) in inner.slots.drain() {
            slot.timer.abort();
        }
    }
}

async fn fire<R>(
    inner: Arc<Mutex<Inner<R>>>,
    key: String,
    generation: u64,
    deadline: Instant,
    work: Box<dyn FnOnce() -> BoxFuture<'static, R> + Send>,
) where
    R: Clone + Send + 'static,
{
    // The quiet period is measured from the schedule call, not from the
    // first poll of this task.
    tokio::time::sleep_until(deadline).await;

    // A newer schedule may have replaced this slot after the sleep finished
    // but before the lock was taken; the generation check settles it.
    let waiters = {
        let mut guard = lock(&inner);
        match guard.slots.get(&key) {
            Some(slot) if slot.generation == generation => guard
                .slots
                .remove(&key)
                .map(|slot| slot.waiters)
                .unwrap_or_default(),
            _ => return,
        }
    };

    debug!(
        key = key.as_str(),
        waiters = waiters.len(),
        "resilient-fetch debounce firing"
    );
    let result = work().await;
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}
