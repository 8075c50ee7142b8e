// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Backend adapter contract for TierStore.
//
// Defines the `KeyValueBackend` trait every physical store implements, the
// `Lifecycle` capability shared by everything that can be set up, torn down,
// maintained and cleared, and the `BackendFactory` used to open named maps.
// Backends are expected to be thread-safe (`Send + Sync`) and asynchronous.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;

/// Expiry value meaning "never expires".
pub const NEVER_EXPIRES: i64 = 0;

/// Current wall-clock time in seconds since the Unix epoch.
pub fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Whether an entry with the given expiry timestamp is dead at `now`.
pub fn is_expired(expiry: i64, now: i64) -> bool {
    expiry > NEVER_EXPIRES && expiry <= now
}

/// Expiry timestamp for an entry written now that should live for
/// `lifespan_secs`. A lifespan of zero never expires.
pub fn expiry_after(lifespan_secs: u64) -> i64 {
    if lifespan_secs == 0 {
        NEVER_EXPIRES
    } else {
        now_epoch_secs().saturating_add(i64::try_from(lifespan_secs).unwrap_or(i64::MAX))
    }
}

/// Setup, teardown and upkeep verbs shared by adapters, tables and stacks.
///
/// The SQL equivalents are `CREATE TABLE IF NOT EXISTS` (setup),
/// `DROP TABLE` (teardown) and `TRUNCATE TABLE` (clear).
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Prepare the backing storage. Must be idempotent.
    async fn setup(&self) -> Result<(), StorageError>;

    /// Delete the backing storage and everything in it.
    async fn teardown(&self) -> Result<(), StorageError>;

    /// Heavy upkeep, such as reclaiming expired entries.
    async fn maintenance(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Cheap upkeep meant to run between requests.
    ///
    /// Adapters without incremental work leave this as a no-op; escalation to
    /// a full [`Lifecycle::maintenance`] run is decided by the caller's
    /// maintenance policy.
    async fn incremental_maintenance(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Remove all data without tearing the storage down.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// A uniform key-value contract over one physical store.
///
/// Keys are strings, values are opaque bytes, and every entry carries an
/// expiry timestamp in seconds since the Unix epoch ([`NEVER_EXPIRES`] means
/// the entry lives until removed). Expired entries behave as absent on every
/// read path; implementations may reclaim them lazily.
///
/// Implementations must be safe to share across threads and tokio tasks.
#[async_trait]
pub trait KeyValueBackend: Lifecycle {
    /// Retrieve the live value associated with `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Store a value with the given expiry, returning the previous live value.
    async fn put(
        &self,
        key: &str,
        value: &[u8],
        expiry: i64,
    ) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete `key`, returning the removed live value if there was one.
    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// All live keys, optionally restricted to those whose value equals
    /// `value_filter`. `None` matches every key.
    async fn keys(&self, value_filter: Option<&[u8]>) -> Result<BTreeSet<String>, StorageError>;

    /// The raw expiry timestamp of a live key, or `None` if absent.
    async fn get_expiry(&self, key: &str) -> Result<Option<i64>, StorageError>;

    /// Replace the expiry timestamp of a live key.
    ///
    /// Returns `Ok(false)` if the key does not exist.
    async fn set_expiry(&self, key: &str, expiry: i64) -> Result<bool, StorageError>;

    /// A human-readable name for this backend, used in logging and errors.
    fn name(&self) -> &str;
}

/// Opens named backend maps on one physical store.
///
/// Opening the same name twice must return a handle onto the same data.
pub trait BackendFactory: Send + Sync {
    /// Open (without setting up) the map called `name`.
    fn open_map(&self, name: &str) -> Result<Arc<dyn KeyValueBackend>, StorageError>;

    /// A human-readable name for the store this factory opens maps on.
    fn name(&self) -> &str;
}
