// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Named object stacks and layered key-value maps.
//!
//! A [`Catalog`] owns one [`BackendFactory`] per layer and hands out stacks
//! by name. Names are case-insensitive and validated before any backend is
//! touched.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use tierstore_storage::{BackendFactory, KeyValueBackend};

use crate::config::StackConfig;
use crate::error::StackError;
use crate::maintenance::{LifecycleOp, Maintained, MaintenanceCoordinator};
use crate::objects::ObjectStack;
use crate::schema::{validate_table_name, Schema};
use crate::stack::LayeredStack;

/// A layered stack of raw key-value maps.
pub type KeyValueStack = LayeredStack<dyn KeyValueBackend>;

fn cache_key(name: &str) -> String {
    name.to_ascii_uppercase()
}

/// Registry of the stacks built on one set of layer factories.
pub struct Catalog {
    factories: Vec<Arc<dyn BackendFactory>>,
    config: StackConfig,
    tables: RwLock<HashMap<String, Arc<ObjectStack>>>,
    maps: RwLock<HashMap<String, Arc<KeyValueStack>>>,
}

impl Catalog {
    /// `factories` are the layers, index 0 first.
    pub fn new(
        factories: Vec<Arc<dyn BackendFactory>>,
        config: StackConfig,
    ) -> Result<Self, StackError> {
        config.validate()?;
        if factories.is_empty() {
            return Err(StackError::InvalidConfig(
                "a catalog needs at least one layer factory".to_string(),
            ));
        }
        Ok(Self {
            factories,
            config,
            tables: RwLock::new(HashMap::new()),
            maps: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Register a table, or return the one already registered under the
    /// same name. New tables are set up on every layer.
    ///
    /// Registering a name again with different field declarations is a
    /// `SchemaViolation`.
    #[instrument(skip(self, schema), fields(table = %schema.table()))]
    pub async fn register(&self, schema: Schema) -> Result<Arc<ObjectStack>, StackError> {
        let key = cache_key(schema.table());
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.get(&key) {
            if existing.schema().fields() != schema.fields() {
                return Err(StackError::SchemaViolation {
                    table: schema.table().to_string(),
                    field: "*".to_string(),
                    reason: "table already registered with different fields".to_string(),
                });
            }
            return Ok(Arc::clone(existing));
        }

        let stack = Arc::new(ObjectStack::open(schema, &self.factories, &self.config)?);
        stack.setup().await?;
        info!(table = %stack.name(), layers = self.factories.len(), "table registered");
        tables.insert(key, Arc::clone(&stack));
        Ok(stack)
    }

    /// Look up a registered table.
    pub async fn table(&self, name: &str) -> Result<Option<Arc<ObjectStack>>, StackError> {
        validate_table_name(name)?;
        Ok(self.tables.read().await.get(&cache_key(name)).cloned())
    }

    /// Tear a table down on every layer and forget it. Returns whether it
    /// was registered.
    pub async fn drop_table(&self, name: &str) -> Result<bool, StackError> {
        validate_table_name(name)?;
        let removed = self.tables.write().await.remove(&cache_key(name));
        match removed {
            Some(stack) => {
                info!(table = %stack.name(), "dropping table");
                stack.teardown().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Get or create the layered key-value map called `name`.
    pub async fn map(&self, name: &str) -> Result<Arc<KeyValueStack>, StackError> {
        validate_table_name(name)?;
        let key = cache_key(name);
        let mut maps = self.maps.write().await;
        if let Some(existing) = maps.get(&key) {
            return Ok(Arc::clone(existing));
        }

        // Table maps always contain '#', which a valid name cannot.
        let map_name = name.to_ascii_lowercase();
        let layers = self
            .factories
            .iter()
            .map(|factory| factory.open_map(&map_name))
            .collect::<Result<Vec<_>, _>>()?;
        let stack = Arc::new(LayeredStack::new(name, layers, &self.config)?);
        stack.setup().await?;
        info!(map = %name, layers = self.factories.len(), "map opened");
        maps.insert(key, Arc::clone(&stack));
        Ok(stack)
    }

    /// Registered table names, sorted.
    pub async fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tables
            .read()
            .await
            .values()
            .map(|t| t.name().to_string())
            .collect();
        names.sort();
        names
    }

    pub async fn maintenance(&self) -> Result<(), StackError> {
        self.members().await.run(LifecycleOp::Maintenance).await
    }

    /// Incremental upkeep on every stack; each stack applies its own
    /// escalation policy.
    pub async fn incremental_maintenance(&self) -> Result<(), StackError> {
        self.members()
            .await
            .run(LifecycleOp::IncrementalMaintenance)
            .await
    }

    pub async fn clear(&self) -> Result<(), StackError> {
        self.members().await.run(LifecycleOp::Clear).await
    }

    /// Tear down every stack, then forget them all, even if some layers
    /// failed.
    pub async fn teardown(&self) -> Result<(), StackError> {
        let result = self.members().await.run(LifecycleOp::Teardown).await;
        self.tables.write().await.clear();
        self.maps.write().await.clear();
        result
    }

    /// Every table, then every map, in name order.
    async fn members(&self) -> MaintenanceCoordinator<dyn Maintained> {
        let mut tables: Vec<(String, Arc<dyn Maintained>)> = self
            .tables
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v) as Arc<dyn Maintained>))
            .collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));

        let mut maps: Vec<(String, Arc<dyn Maintained>)> = self
            .maps
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), Arc::clone(v) as Arc<dyn Maintained>))
            .collect();
        maps.sort_by(|a, b| a.0.cmp(&b.0));

        MaintenanceCoordinator::new(tables.into_iter().chain(maps).map(|(_, m)| m).collect())
    }
}
