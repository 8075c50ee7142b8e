// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TierStore Backend Adapters
//
// This crate provides the key-value contract every TierStore layer sits on.
// The `KeyValueBackend` trait lets the object tables and the layered stack
// swap physical stores (process memory, an embedded redb file, ...) without
// changing application logic.
//
// # Modules
//
// - [`backend`] -- The `KeyValueBackend`, `Lifecycle` and `BackendFactory`
//   traits plus expiry helpers.
// - [`error`] -- The `StorageError` enum covering all adapter failure modes.
// - [`memory`] -- An in-memory `BTreeMap`-based adapter and its factory.
// - [`typed`] -- A serde-based typed view over one map.
// - [`metrics`] -- A transparent wrapper that collects operation statistics.
//
// # Example
//
// ```rust
// use std::sync::Arc;
// use tierstore_storage::backend::NEVER_EXPIRES;
// use tierstore_storage::memory::InMemoryBackend;
// use tierstore_storage::metrics::MetricsBackend;
// use tierstore_storage::typed::TypedMap;
//
// # tokio_test::block_on(async {
// let metered = Arc::new(MetricsBackend::new(InMemoryBackend::new()));
// let map: TypedMap<serde_json::Value, _> = TypedMap::new(Arc::clone(&metered));
// map.put("e1", &serde_json::json!({"name": "test"}), NEVER_EXPIRES).await.unwrap();
//
// let val = map.get("e1").await.unwrap().unwrap();
// assert_eq!(val["name"], "test");
// assert_eq!(metered.stats().await.hit_count, 1);
// # });
// ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod typed;

// Optional persistent backends, feature-gated.
#[cfg(feature = "redb-backend")]
pub mod redb_backend;

pub use backend::{
    expiry_after, is_expired, now_epoch_secs, BackendFactory, KeyValueBackend, Lifecycle,
    NEVER_EXPIRES,
};
pub use error::StorageError;
pub use memory::{InMemoryBackend, InMemoryFactory};
pub use metrics::{BackendStats, MetricsBackend};
pub use typed::TypedMap;

#[cfg(feature = "redb-backend")]
pub use redb_backend::{RedbBackend, RedbFactory};
