//! Process-wide TTL store.

use super::key::CacheKey;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration) -> Self {
        Self::at(value, ttl, Instant::now())
    }

    fn at(value: Value, ttl: Duration, inserted_at: Instant) -> Self {
        Self {
            value,
            inserted_at,
            ttl,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh iff `now - inserted_at < ttl`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) < self.ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub swept: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    swept: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

/// TTL-only key/value store shared by every client that is handed the same `Arc`.
///
/// Freshness is checked on every read, so the periodic sweep started by
/// [`CacheStore::start`] only reclaims memory. All operations are serialized
/// by one mutex; an entry is never observed half-written.
pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
    stats: AtomicStats,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheStore {
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

    pub fn new() -> Self {
        Self::with_sweep_interval(Self::DEFAULT_SWEEP_INTERVAL)
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            stats: AtomicStats::default(),
            sweep_interval: sweep_interval.max(Duration::from_millis(1)),
            sweeper: Mutex::new(None),
        }
    }

    /// Convenience for the common case of one store injected into many clients.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sweeper(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.get_at(key, Instant::now())
    }

    /// Read as of `now`. Stale entries are reported absent and dropped.
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<CacheEntry> {
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_fresh_at(now) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite. A zero TTL stores nothing, since the entry would never be fresh.
    pub fn set(&self, key: CacheKey, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.entries().insert(key, CacheEntry::new(value, ttl));
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self, key: &CacheKey) -> bool {
        let removed = self.entries().remove(key).is_some();
        if removed {
            self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Remove every entry that is stale as of `now`; returns how many went.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh_at(now));
        let removed = before - entries.len();
        self.stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of fresh entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries()
            .values()
            .filter(|entry| entry.is_fresh_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Start the periodic sweep. Returns `false` if it was already running.
    ///
    /// The task holds only a weak reference, so dropping the last `Arc`
    /// ends it. Must be called from within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut sweeper = self.sweeper();
        if sweeper.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return false;
        }
        let store: Weak<Self> = Arc::downgrade(self);
        let period = self.sweep_interval;
        let first = Instant::now() + period;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep(Instant::now());
                if removed > 0 {
                    debug!(removed, "resilient-fetch cache sweep");
                }
            }
        }));
        true
    }

    /// Stop the periodic sweep. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        match self.sweeper().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.sweeper()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper().take() {
            handle.abort();
        }
    }
}
