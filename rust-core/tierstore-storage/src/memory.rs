// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory backend adapter for TierStore.
//
// Uses a `BTreeMap` wrapped in a tokio `RwLock` for thread-safe, ordered
// key-value storage with per-entry expiry. Intended for cache layers,
// testing, and small ephemeral datasets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock as StdRwLock};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::{is_expired, now_epoch_secs, BackendFactory, KeyValueBackend, Lifecycle};
use crate::error::StorageError;

/// A stored value together with its expiry timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    value: Vec<u8>,
    expiry: i64,
}

impl Entry {
    fn is_live(&self, now: i64) -> bool {
        !is_expired(self.expiry, now)
    }
}

/// An in-memory backend adapter backed by a sorted `BTreeMap`.
///
/// All data lives in process memory and is lost on drop. Thread-safe via
/// `Arc<RwLock<...>>`; clones share the same map.
///
/// # Example
///
/// ```rust
/// use tierstore_storage::memory::InMemoryBackend;
/// use tierstore_storage::backend::{KeyValueBackend, NEVER_EXPIRES};
///
/// # tokio_test::block_on(async {
/// let store = InMemoryBackend::new();
/// store.put("hello", b"world", NEVER_EXPIRES).await.unwrap();
/// let val = store.get("hello").await.unwrap();
/// assert_eq!(val, Some(b"world".to_vec()));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    name: Arc<str>,
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
}

impl InMemoryBackend {
    /// Create a new, empty in-memory backend.
    pub fn new() -> Self {
        Self::named("in-memory")
    }

    /// Create a new, empty in-memory backend with a descriptive name.
    pub fn named(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Number of entries currently held, including expired ones not yet
    /// reclaimed.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Return true if the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    /// Drop `key` if it is still expired. Called after a read observed an
    /// expired entry under the shared lock.
    async fn reclaim(&self, key: &str) {
        let now = now_epoch_secs();
        let mut map = self.data.write().await;
        if map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            map.remove(key);
            debug!(backend = %self.name, key, "reclaimed expired entry");
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Lifecycle for InMemoryBackend {
    async fn setup(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn teardown(&self) -> Result<(), StorageError> {
        self.data.write().await.clear();
        info!(backend = %self.name, "in-memory map torn down");
        Ok(())
    }

    async fn maintenance(&self) -> Result<(), StorageError> {
        let now = now_epoch_secs();
        let mut map = self.data.write().await;
        let before = map.len();
        map.retain(|_, entry| entry.is_live(now));
        let reclaimed = before - map.len();
        if reclaimed > 0 {
            debug!(backend = %self.name, reclaimed, "maintenance reclaimed expired entries");
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.data.write().await.clear();
        Ok(())
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = now_epoch_secs();
        let expired = {
            let map = self.data.read().await;
            match map.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.reclaim(key).await;
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        expiry: i64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let now = now_epoch_secs();
        let mut map = self.data.write().await;
        let previous = map.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expiry,
            },
        );
        Ok(previous.filter(|entry| entry.is_live(now)).map(|entry| entry.value))
    }

    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let now = now_epoch_secs();
        let mut map = self.data.write().await;
        Ok(map
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn keys(&self, value_filter: Option<&[u8]>) -> Result<BTreeSet<String>, StorageError> {
        let now = now_epoch_secs();
        let map = self.data.read().await;
        Ok(map
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .filter(|(_, entry)| value_filter.map_or(true, |wanted| entry.value == wanted))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let now = now_epoch_secs();
        let map = self.data.read().await;
        Ok(map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.expiry))
    }

    async fn set_expiry(&self, key: &str, expiry: i64) -> Result<bool, StorageError> {
        let now = now_epoch_secs();
        let mut map = self.data.write().await;
        match map.get_mut(key) {
            Some(entry) if entry.is_live(now) => {
                entry.expiry = expiry;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Opens [`InMemoryBackend`] maps, handing back the same map for the same
/// name so that reopening a table sees its earlier writes.
#[derive(Debug, Default)]
pub struct InMemoryFactory {
    maps: StdRwLock<HashMap<String, InMemoryBackend>>,
}

impl InMemoryFactory {
    /// Create a factory with no maps opened yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendFactory for InMemoryFactory {
    fn open_map(&self, name: &str) -> Result<Arc<dyn KeyValueBackend>, StorageError> {
        let mut maps = self.maps.write().map_err(|_| {
            StorageError::BackendUnavailable("in-memory factory lock poisoned".into())
        })?;
        let map = maps
            .entry(name.to_string())
            .or_insert_with(|| InMemoryBackend::named(&format!("in-memory:{name}")))
            .clone();
        Ok(Arc::new(map))
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NEVER_EXPIRES;

    #[tokio::test]
    async fn test_basic_crud() {
        let backend = InMemoryBackend::new();

        // Initially empty.
        assert!(backend.is_empty().await);
        assert_eq!(backend.get("key1").await.unwrap(), None);

        // Put returns the previous value.
        assert_eq!(backend.put("key1", b"value1", NEVER_EXPIRES).await.unwrap(), None);
        assert_eq!(backend.get("key1").await.unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.len().await, 1);

        // Overwrite.
        let previous = backend.put("key1", b"updated", NEVER_EXPIRES).await.unwrap();
        assert_eq!(previous, Some(b"value1".to_vec()));
        assert_eq!(backend.get("key1").await.unwrap(), Some(b"updated".to_vec()));
        assert_eq!(backend.len().await, 1);

        // Remove existing key.
        assert_eq!(backend.remove("key1").await.unwrap(), Some(b"updated".to_vec()));
        assert_eq!(backend.get("key1").await.unwrap(), None);
        assert!(backend.is_empty().await);

        // Remove non-existent key.
        assert_eq!(backend.remove("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entry_reads_as_absent_and_is_reclaimed() {
        let backend = InMemoryBackend::new();
        let past = now_epoch_secs() - 10;

        backend.put("stale", b"old", past).await.unwrap();
        assert_eq!(backend.len().await, 1);

        assert_eq!(backend.get("stale").await.unwrap(), None);
        // The read reclaimed it lazily.
        assert_eq!(backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_future_expiry_is_live() {
        let backend = InMemoryBackend::new();
        let future = now_epoch_secs() + 3600;

        backend.put("fresh", b"new", future).await.unwrap();
        assert_eq!(backend.get("fresh").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(backend.get_expiry("fresh").await.unwrap(), Some(future));
    }

    #[tokio::test]
    async fn test_keys_with_and_without_filter() {
        let backend = InMemoryBackend::new();
        backend.put("a", b"x", NEVER_EXPIRES).await.unwrap();
        backend.put("b", b"y", NEVER_EXPIRES).await.unwrap();
        backend.put("c", b"x", NEVER_EXPIRES).await.unwrap();
        backend.put("d", b"x", now_epoch_secs() - 1).await.unwrap();

        let all = backend.keys(None).await.unwrap();
        assert_eq!(all.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);

        let xs = backend.keys(Some(b"x")).await.unwrap();
        assert_eq!(xs.into_iter().collect::<Vec<_>>(), vec!["a", "c"]);

        assert!(backend.keys(Some(b"zzz")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_expiry() {
        let backend = InMemoryBackend::new();
        backend.put("k", b"v", NEVER_EXPIRES).await.unwrap();
        assert_eq!(backend.get_expiry("k").await.unwrap(), Some(NEVER_EXPIRES));

        assert!(backend.set_expiry("k", now_epoch_secs() - 5).await.unwrap());
        assert_eq!(backend.get("k").await.unwrap(), None);

        // Missing key cannot have its expiry set.
        assert!(!backend.set_expiry("missing", 10).await.unwrap());
        assert_eq!(backend.get_expiry("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_maintenance_reclaims_expired() {
        let backend = InMemoryBackend::new();
        backend.put("live", b"1", NEVER_EXPIRES).await.unwrap();
        backend.put("dead", b"2", now_epoch_secs() - 1).await.unwrap();
        assert_eq!(backend.len().await, 2);

        backend.maintenance().await.unwrap();
        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.get("live").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_clear_and_teardown() {
        let backend = InMemoryBackend::new();
        backend.setup().await.unwrap();
        backend.put("k", b"v", NEVER_EXPIRES).await.unwrap();
        backend.clear().await.unwrap();
        assert!(backend.is_empty().await);

        backend.put("k", b"v", NEVER_EXPIRES).await.unwrap();
        backend.teardown().await.unwrap();
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_name() {
        assert_eq!(InMemoryBackend::new().name(), "in-memory");
        assert_eq!(InMemoryBackend::named("cache").name(), "cache");
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();

        backend.put("shared", b"data", NEVER_EXPIRES).await.unwrap();
        assert_eq!(clone.get("shared").await.unwrap(), Some(b"data".to_vec()));
    }

    #[tokio::test]
    async fn test_factory_reopens_same_map() {
        let factory = InMemoryFactory::new();
        let first = factory.open_map("users").unwrap();
        first.put("id", b"1", NEVER_EXPIRES).await.unwrap();

        let again = factory.open_map("users").unwrap();
        assert_eq!(again.get("id").await.unwrap(), Some(b"1".to_vec()));

        let other = factory.open_map("orders").unwrap();
        assert_eq!(other.get("id").await.unwrap(), None);
        assert_eq!(other.name(), "in-memory:orders");
    }
}
