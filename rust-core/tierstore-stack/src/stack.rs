// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Layered stack: N layers, one logical store.
//!
//! Layer 0 has the highest priority. Reads fall through the layers in order
//! and copy a lower-layer hit into every layer above it. Writes and removes
//! go to every layer. Layer failures are collected and reported once per
//! call; nothing is rolled back.
//!
//! # Concurrency
//!
//! Calls for the same identifier are serialised through a striped set of
//! mutexes, held around the read-then-populate sequence and around write and
//! remove fan-out. A write therefore cannot land between a lower-layer read
//! and the population of the layers above it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use tierstore_storage::expiry_after;

use crate::config::StackConfig;
use crate::error::{LayerFailure, StackError};
use crate::layer::StackLayer;
use crate::maintenance::{
    run_incremental, IncrementalPolicy, LifecycleOp, Maintained, MaintenanceCoordinator,
};

/// Striped per-identifier locks.
struct IdLocks {
    stripes: Vec<Mutex<()>>,
}

impl IdLocks {
    fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

/// An ordered composition of layers behind one read/write API.
pub struct LayeredStack<L: ?Sized> {
    name: String,
    coordinator: MaintenanceCoordinator<L>,
    locks: IdLocks,
    policy: IncrementalPolicy,
    lifespan_secs: u64,
}

impl<L: StackLayer + ?Sized> LayeredStack<L> {
    /// Compose `layers`, index 0 first. The list must not be empty.
    pub fn new(
        name: impl Into<String>,
        layers: Vec<Arc<L>>,
        config: &StackConfig,
    ) -> Result<Self, StackError> {
        config.validate()?;
        if layers.is_empty() {
            return Err(StackError::InvalidConfig(
                "a stack needs at least one layer".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            coordinator: MaintenanceCoordinator::new(layers),
            locks: IdLocks::new(config.lock_stripes),
            policy: IncrementalPolicy::from_config(config),
            lifespan_secs: config.default_lifespan_secs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layers in priority order.
    pub fn layers(&self) -> &[Arc<L>] {
        self.coordinator.members()
    }

    pub fn layer(&self, index: usize) -> Option<&Arc<L>> {
        self.layers().get(index)
    }

    pub fn len(&self) -> usize {
        self.layers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers().is_empty()
    }

    pub fn policy(&self) -> &IncrementalPolicy {
        &self.policy
    }

    /// Read `id`, falling through the layers and populating the ones above
    /// a lower-layer hit.
    ///
    /// A hit is returned even if a layer above it failed. A miss while any
    /// layer failed is reported as `PartialLayerFailure`.
    #[instrument(skip(self), fields(stack = %self.name))]
    pub async fn read(&self, id: &str) -> Result<Option<L::Value>, StackError> {
        let _guard = self.locks.lock(id).await;
        self.read_locked(id).await
    }

    /// Write `value` to every layer with the default lifespan.
    #[instrument(skip(self, value), fields(stack = %self.name))]
    pub async fn write(&self, id: &str, value: &L::Value) -> Result<(), StackError> {
        let _guard = self.locks.lock(id).await;
        self.write_locked(id, value, expiry_after(self.lifespan_secs))
            .await
    }

    /// Write `value` to every layer with an explicit expiry timestamp.
    #[instrument(skip(self, value), fields(stack = %self.name))]
    pub async fn write_expiring(
        &self,
        id: &str,
        value: &L::Value,
        expiry: i64,
    ) -> Result<(), StackError> {
        let _guard = self.locks.lock(id).await;
        self.write_locked(id, value, expiry).await
    }

    /// Read the current value, derive a new one and write it through, all
    /// under the identifier's lock.
    pub async fn update<F>(&self, id: &str, derive: F) -> Result<L::Value, StackError>
    where
        F: FnOnce(Option<L::Value>) -> L::Value + Send,
    {
        let _guard = self.locks.lock(id).await;
        let current = self.read_locked(id).await?;
        let value = derive(current);
        self.write_locked(id, &value, expiry_after(self.lifespan_secs))
            .await?;
        Ok(value)
    }

    /// Remove `id` from every layer. Removing an absent id is not an error.
    /// Returns whether any layer held it.
    #[instrument(skip(self), fields(stack = %self.name))]
    pub async fn remove(&self, id: &str) -> Result<bool, StackError> {
        let _guard = self.locks.lock(id).await;
        let mut removed = false;
        let mut failures = Vec::new();
        for (index, layer) in self.layers().iter().enumerate() {
            match layer.discard(id).await {
                Ok(found) => removed |= found,
                Err(err) => {
                    warn!(layer = index, name = layer.label(), error = %err, "remove failed");
                    failures.push(LayerFailure::new(index, layer.label(), err));
                }
            }
        }
        self.fan_out_result("remove", failures)?;
        Ok(removed)
    }

    pub async fn setup(&self) -> Result<(), StackError> {
        info!(stack = %self.name, layers = self.len(), "setting up stack");
        self.coordinator.run(LifecycleOp::Setup).await
    }

    pub async fn teardown(&self) -> Result<(), StackError> {
        info!(stack = %self.name, "tearing down stack");
        self.coordinator.run(LifecycleOp::Teardown).await
    }

    pub async fn maintenance(&self) -> Result<(), StackError> {
        info!(stack = %self.name, "running maintenance");
        self.coordinator.run(LifecycleOp::Maintenance).await
    }

    /// Cheap upkeep on every layer, escalating to full maintenance with the
    /// configured probability. Returns whether it escalated.
    pub async fn incremental_maintenance(&self) -> Result<bool, StackError> {
        run_incremental(&self.coordinator, &self.policy).await
    }

    pub async fn clear(&self) -> Result<(), StackError> {
        info!(stack = %self.name, "clearing stack");
        self.coordinator.run(LifecycleOp::Clear).await
    }

    async fn read_locked(&self, id: &str) -> Result<Option<L::Value>, StackError> {
        let mut failures = Vec::new();
        for (index, layer) in self.layers().iter().enumerate() {
            match layer.fetch(id).await {
                Ok(Some((value, expiry))) => {
                    if !failures.is_empty() {
                        warn!(
                            layer = index,
                            failed = failures.len(),
                            "read served by a lower layer after failures above it"
                        );
                    }
                    self.populate(id, &value, expiry, index).await;
                    return Ok(Some(value));
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(layer = index, name = layer.label(), error = %err, "read failed");
                    failures.push(LayerFailure::new(index, layer.label(), err));
                }
            }
        }
        self.fan_out_result("read", failures)?;
        Ok(None)
    }

    /// Copy a hit at layer `hit` into layers `0..hit` with the expiry of the
    /// entry it was read from. Failures are logged and do not affect the
    /// read.
    async fn populate(&self, id: &str, value: &L::Value, expiry: i64, hit: usize) {
        for (index, layer) in self.layers()[..hit].iter().enumerate() {
            match layer.store(id, value, expiry).await {
                Ok(()) => debug!(layer = index, source = hit, "populated from lower layer"),
                Err(err) => {
                    warn!(layer = index, name = layer.label(), error = %err, "cache population failed")
                }
            }
        }
    }

    async fn write_locked(
        &self,
        id: &str,
        value: &L::Value,
        expiry: i64,
    ) -> Result<(), StackError> {
        let mut failures = Vec::new();
        for (index, layer) in self.layers().iter().enumerate() {
            if let Err(err) = layer.store(id, value, expiry).await {
                warn!(layer = index, name = layer.label(), error = %err, "write failed");
                failures.push(LayerFailure::new(index, layer.label(), err));
            }
        }
        self.fan_out_result("write", failures)
    }

    fn fan_out_result(
        &self,
        operation: &str,
        failures: Vec<LayerFailure>,
    ) -> Result<(), StackError> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(StackError::PartialLayerFailure {
                operation: operation.to_string(),
                attempted: self.len(),
                failures,
            })
        }
    }
}

#[async_trait]
impl<L: StackLayer + ?Sized> Maintained for LayeredStack<L> {
    fn label(&self) -> &str {
        &self.name
    }

    async fn apply(&self, op: LifecycleOp) -> Result<(), StackError> {
        match op {
            LifecycleOp::IncrementalMaintenance => self.incremental_maintenance().await.map(|_| ()),
            other => self.coordinator.run(other).await,
        }
    }
}
