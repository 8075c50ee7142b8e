// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Typed map wrapper for TierStore.
//
// Provides a serde-based interface on top of any `KeyValueBackend`. Values
// are serialized as JSON, so a column of typed values can live in any
// adapter that only understands bytes.

use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::KeyValueBackend;
use crate::error::StorageError;

/// A typed view over one backend map.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tierstore_storage::memory::InMemoryBackend;
/// use tierstore_storage::typed::TypedMap;
/// use tierstore_storage::backend::NEVER_EXPIRES;
///
/// # tokio_test::block_on(async {
/// let map: TypedMap<u32, _> = TypedMap::new(Arc::new(InMemoryBackend::new()));
/// map.put("alice", &30, NEVER_EXPIRES).await.unwrap();
/// assert_eq!(map.get("alice").await.unwrap(), Some(30));
/// # });
/// ```
pub struct TypedMap<T, B: KeyValueBackend + ?Sized> {
    backend: Arc<B>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, B: KeyValueBackend + ?Sized> Clone for TypedMap<T, B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        }
    }
}

impl<T, B> TypedMap<T, B>
where
    T: Serialize + DeserializeOwned,
    B: KeyValueBackend + ?Sized,
{
    /// Wrap `backend` with typed access.
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            _marker: PhantomData,
        }
    }

    /// Return the underlying backend.
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<T, StorageError> {
        serde_json::from_slice(bytes).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to deserialize value for key '{}' in '{}': {}",
                key,
                self.backend.name(),
                err
            ))
        })
    }

    fn encode(&self, key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
        serde_json::to_vec(value).map_err(|err| {
            StorageError::SerializationError(format!(
                "failed to serialize value for key '{}': {}",
                key, err
            ))
        })
    }

    /// Retrieve and deserialize a value. Returns `Ok(None)` if absent.
    pub async fn get(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.get(key).await? {
            Some(bytes) => Ok(Some(self.decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a value, returning the previous value.
    pub async fn put(&self, key: &str, value: &T, expiry: i64) -> Result<Option<T>, StorageError> {
        let bytes = self.encode(key, value)?;
        match self.backend.put(key, &bytes, expiry).await? {
            Some(previous) => Ok(Some(self.decode(key, &previous)?)),
            None => Ok(None),
        }
    }

    /// Delete a value, returning it if it existed.
    pub async fn remove(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.backend.remove(key).await? {
            Some(previous) => Ok(Some(self.decode(key, &previous)?)),
            None => Ok(None),
        }
    }

    /// Keys whose value equals `filter` (all keys for `None`).
    pub async fn keys(&self, filter: Option<&T>) -> Result<BTreeSet<String>, StorageError> {
        match filter {
            Some(value) => {
                let bytes = self.encode("<filter>", value)?;
                self.backend.keys(Some(&bytes)).await
            }
            None => self.backend.keys(None).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NEVER_EXPIRES;
    use crate::memory::InMemoryBackend;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestRecord {
        name: String,
        score: f64,
    }

    #[tokio::test]
    async fn test_typed_put_get_remove() {
        let map: TypedMap<TestRecord, InMemoryBackend> =
            TypedMap::new(Arc::new(InMemoryBackend::new()));

        let record = TestRecord {
            name: "Alice".to_string(),
            score: 95.5,
        };

        assert!(map.put("rec1", &record, NEVER_EXPIRES).await.unwrap().is_none());
        assert_eq!(map.get("rec1").await.unwrap(), Some(record.clone()));
        assert!(map.get("nonexistent").await.unwrap().is_none());

        assert_eq!(map.remove("rec1").await.unwrap(), Some(record));
        assert!(map.remove("rec1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_typed_keys_filter() {
        let map: TypedMap<String, InMemoryBackend> =
            TypedMap::new(Arc::new(InMemoryBackend::new()));
        map.put("a", &"x".to_string(), NEVER_EXPIRES).await.unwrap();
        map.put("b", &"y".to_string(), NEVER_EXPIRES).await.unwrap();

        let xs = map.keys(Some(&"x".to_string())).await.unwrap();
        assert_eq!(xs.len(), 1);
        assert!(xs.contains("a"));
        assert_eq!(map.keys(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_deserialization_error() {
        let backend = Arc::new(InMemoryBackend::named("bad"));
        backend.put("broken", b"not-valid-json!!!", NEVER_EXPIRES).await.unwrap();

        let map: TypedMap<TestRecord, InMemoryBackend> = TypedMap::new(backend);
        match map.get("broken").await.unwrap_err() {
            StorageError::SerializationError(msg) => {
                assert!(msg.contains("failed to deserialize"));
                assert!(msg.contains("bad"));
            }
            other => panic!("expected SerializationError, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_works_over_trait_objects() {
        let backend: Arc<dyn KeyValueBackend> = Arc::new(InMemoryBackend::new());
        let map: TypedMap<i64, dyn KeyValueBackend> = TypedMap::new(backend);
        map.put("n", &42, NEVER_EXPIRES).await.unwrap();
        assert_eq!(map.get("n").await.unwrap(), Some(42));
        assert_eq!(map.backend().name(), "in-memory");
    }
}
