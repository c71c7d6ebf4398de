//! Supersession-aware cancellation.
//!
//! A [`CancellationScope`] remembers, per scope key, the token of the logical
//! request currently in flight. Beginning a new request for a key cancels the
//! previous token, so "who cancels whom" is an explicit relationship rather
//! than something inferred from closures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Identity of a logical requester, typically one client instance.
pub type ScopeKey = u64;

static NEXT_SCOPE_KEY: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique scope key.
pub fn next_scope_key() -> ScopeKey {
    NEXT_SCOPE_KEY.fetch_add(1, Ordering::Relaxed)
}

/// The token handed to one in-flight logical request.
#[derive(Debug, Clone)]
pub struct AttemptToken {
    key: ScopeKey,
    generation: u64,
    token: CancellationToken,
}

impl AttemptToken {
    pub fn key(&self) -> ScopeKey {
        self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct CancellationScope {
    slots: Mutex<HashMap<ScopeKey, Slot>>,
    next_generation: AtomicU64,
}

impl CancellationScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ScopeKey, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel whatever is active for `key` and install a fresh token.
    pub fn begin(&self, key: ScopeKey) -> AttemptToken {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        let previous = self.slots().insert(
            key,
            Slot {
                generation,
                token: token.clone(),
            },
        );
        if let Some(prev) = previous {
            prev.token.cancel();
        }
        AttemptToken {
            key,
            generation,
            token,
        }
    }

    /// Cancel the active token for `key`, if any. Returns whether one was active.
    pub fn cancel_previous(&self, key: ScopeKey) -> bool {
        match self.slots().remove(&key) {
            Some(prev) => {
                prev.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `token` is still the active, uncancelled token for its key.
    pub fn is_current(&self, token: &AttemptToken) -> bool {
        !token.is_cancelled()
            && self
                .slots()
                .get(&token.key)
                .map(|slot| slot.generation == token.generation)
                .unwrap_or(false)
    }

    /// Release the slot held by `token` once its request has resolved.
    /// A newer request's slot is left alone.
    pub fn finish(&self, token: &AttemptToken) {
        let mut slots = self.slots();
        if slots
            .get(&token.key)
            .map(|slot| slot.generation == token.generation)
            .unwrap_or(false)
        {
            slots.remove(&token.key);
        }
    }

    /// Generation of the active request for `key`.
    pub fn active_generation(&self, key: ScopeKey) -> Option<u64> {
        self.slots().get(&key).map(|slot| slot.generation)
    }

    pub fn active_count(&self) -> usize {
        self.slots().len()
    }

    pub fn cancel_all(&self) {
        for (_, slot) in self.slots().drain() {
            slot.token.cancel();
        }
    }
}
