//! 响应缓存模块：跨客户端共享的 TTL 缓存。
//!
//! # Response Caching Module
//!
//! A time-bounded cache shared across call sites. Entries live until their TTL
//! elapses; there is no capacity bound and no LRU eviction.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheStore`] | Mutex-serialized TTL store with an optional periodic sweep |
//! | [`CacheEntry`] | Stored value plus insertion time and TTL |
//! | [`CacheKey`] | Deterministic key derived from method, URL, params and body |
//! | [`CacheStats`] | Hit/miss/set/delete/sweep counters |
//!
//! ## Example
//!
//! ```rust
//! use resilient_fetch::cache::{CacheKey, CacheStore};
//! use std::time::Duration;
//!
//! let store = CacheStore::shared();
//! let key = CacheKey::derive("GET", "/api/services", None, None);
//! store.set(key.clone(), serde_json::json!(["plumbing"]), Duration::from_secs(300));
//! assert!(store.get(&key).is_some());
//! ```
//!
//! ## Freshness
//!
//! An entry is fresh iff `now - inserted_at < ttl`. Reads check freshness
//! themselves; the sweep started with [`CacheStore::start`] exists only to
//! reclaim memory and can be stopped with [`CacheStore::stop`].
//!
//! Clients sharing a store and a key race on writes: the last successful
//! response written wins. There is no cross-client single-flight.

mod key;
mod store;

pub use key::CacheKey;
pub use store::{CacheEntry, CacheStats, CacheStore};
