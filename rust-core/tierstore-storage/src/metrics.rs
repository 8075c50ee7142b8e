// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Metrics-collecting wrapper for TierStore backend adapters.
//
// Wraps any `KeyValueBackend` and transparently counts operations, cache
// hits and misses, and read latency. Handy for checking that an upper
// layer actually absorbs reads before they reach a durable layer.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{KeyValueBackend, Lifecycle};
use crate::error::StorageError;

/// Accumulated statistics for a backend adapter.
///
/// All counters are monotonically increasing for the lifetime of the
/// [`MetricsBackend`] that owns them, until [`MetricsBackend::reset_stats`].
#[derive(Debug, Clone, Default)]
pub struct BackendStats {
    /// Number of `get` operations performed.
    pub get_count: u64,
    /// `get` calls that found a live value.
    pub hit_count: u64,
    /// `get` calls that found nothing.
    pub miss_count: u64,
    /// Number of `put` operations performed.
    pub put_count: u64,
    /// Number of `remove` operations performed.
    pub remove_count: u64,
    /// Number of `keys` scans performed.
    pub keys_count: u64,
    /// Number of failed operations of any kind.
    pub error_count: u64,
    /// Cumulative wall-clock latency of all `get` calls, in milliseconds.
    pub get_latency_sum_ms: f64,
}

impl BackendStats {
    /// Fraction of reads that hit, or `None` before the first read.
    pub fn hit_ratio(&self) -> Option<f64> {
        (self.get_count > 0).then(|| self.hit_count as f64 / self.get_count as f64)
    }
}

/// A backend wrapper that collects operation metrics.
///
/// # Example
///
/// ```rust
/// use tierstore_storage::memory::InMemoryBackend;
/// use tierstore_storage::metrics::MetricsBackend;
/// use tierstore_storage::backend::{KeyValueBackend, NEVER_EXPIRES};
///
/// # tokio_test::block_on(async {
/// let metered = MetricsBackend::new(InMemoryBackend::new());
///
/// metered.put("key", b"value", NEVER_EXPIRES).await.unwrap();
/// metered.get("key").await.unwrap();
/// metered.get("other").await.unwrap();
///
/// let stats = metered.stats().await;
/// assert_eq!(stats.put_count, 1);
/// assert_eq!(stats.hit_count, 1);
/// assert_eq!(stats.miss_count, 1);
/// # });
/// ```
pub struct MetricsBackend<B: KeyValueBackend> {
    inner: B,
    stats: Arc<RwLock<BackendStats>>,
}

impl<B: KeyValueBackend> MetricsBackend<B> {
    /// Wrap `inner` with metrics collection.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(BackendStats::default())),
        }
    }

    /// Return a snapshot of the current statistics.
    pub async fn stats(&self) -> BackendStats {
        self.stats.read().await.clone()
    }

    /// Reset all statistics to zero.
    pub async fn reset_stats(&self) {
        *self.stats.write().await = BackendStats::default();
    }

    /// Return a reference to the inner backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn record<T>(&self, result: &Result<T, StorageError>, bump: impl FnOnce(&mut BackendStats)) {
        let mut s = self.stats.write().await;
        bump(&mut s);
        if result.is_err() {
            s.error_count += 1;
        }
    }
}

#[async_trait]
impl<B: KeyValueBackend> Lifecycle for MetricsBackend<B> {
    async fn setup(&self) -> Result<(), StorageError> {
        self.inner.setup().await
    }

    async fn teardown(&self) -> Result<(), StorageError> {
        self.inner.teardown().await
    }

    async fn maintenance(&self) -> Result<(), StorageError> {
        self.inner.maintenance().await
    }

    async fn incremental_maintenance(&self) -> Result<(), StorageError> {
        self.inner.incremental_maintenance().await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.inner.clear().await
    }
}

#[async_trait]
impl<B: KeyValueBackend> KeyValueBackend for MetricsBackend<B> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.record(&result, |s| {
            s.get_count += 1;
            s.get_latency_sum_ms += elapsed_ms;
            match &result {
                Ok(Some(_)) => s.hit_count += 1,
                Ok(None) => s.miss_count += 1,
                Err(_) => {}
            }
        })
        .await;
        result
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        expiry: i64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let result = self.inner.put(key, value, expiry).await;
        self.record(&result, |s| s.put_count += 1).await;
        result
    }

    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let result = self.inner.remove(key).await;
        self.record(&result, |s| s.remove_count += 1).await;
        result
    }

    async fn keys(&self, value_filter: Option<&[u8]>) -> Result<BTreeSet<String>, StorageError> {
        let result = self.inner.keys(value_filter).await;
        self.record(&result, |s| s.keys_count += 1).await;
        result
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<i64>, StorageError> {
        self.inner.get_expiry(key).await
    }

    async fn set_expiry(&self, key: &str, expiry: i64) -> Result<bool, StorageError> {
        self.inner.set_expiry(key, expiry).await
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
