//! Session store trait and the in-memory implementation.
//!
//! The store is an external collaborator: an opaque key-value service with
//! atomic create-if-absent and TTL expiry. The trait is the whole contract —
//! the session layer never sees connection pooling, retries, or the store's
//! own failure handling.
//!
//! [`MemoryStore`] backs development and tests. A production deployment
//! implements [`SessionStore`] over its real store client and hands it to
//! [`Server::store`](crate::Server::store).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Failure talking to the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session store backend: {0}")]
    Backend(String),
}

/// Key-value store with atomic create-if-absent and per-key expiry.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Stores `value` under `key` only if the key is absent (or expired).
    /// Returns `true` if the write happened, `false` if the key already held
    /// a live value.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Fetches the live value under `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// In-memory [`SessionStore`] backed by [`DashMap`].
///
/// Expired entries are dropped lazily on access; there is no background
/// sweeper, which is fine for the development and test workloads this store
/// exists for.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let stored = StoredValue {
            value: value.to_owned(),
            expires_at: Instant::now() + ttl,
        };
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                if slot.get().is_live() {
                    return Ok(false);
                }
                slot.insert(stored);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let live = self
            .entries
            .get(key)
            .and_then(|entry| entry.is_live().then(|| entry.value.clone()));
        if live.is_none() {
            // Lazy cleanup; the guard above is dropped before this runs.
            self.entries.remove_if(key, |_, stored| !stored.is_live());
        }
        Ok(live)
    }
}
