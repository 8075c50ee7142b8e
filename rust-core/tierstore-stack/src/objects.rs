// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! A layered stack of object tables sharing one schema.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use tierstore_query::{FieldValue, Query, Record, ID_FIELD};
use tierstore_storage::BackendFactory;

use crate::config::StackConfig;
use crate::error::StackError;
use crate::maintenance::{LifecycleOp, Maintained};
use crate::schema::Schema;
use crate::stack::LayeredStack;
use crate::table::{assemble, build_query, new_record_id, ObjectTable};

/// The application-facing object store: one [`ObjectTable`] per layer.
///
/// Reads fall through the layers and warm the ones above; writes go to all
/// of them. Scans and queries are answered by a single layer, chosen by
/// [`StackConfig::query_layer`].
pub struct ObjectStack {
    schema: Arc<Schema>,
    stack: LayeredStack<ObjectTable>,
    query_layer: usize,
}

impl ObjectStack {
    /// Open one table per factory, index 0 first.
    pub fn open(
        schema: Schema,
        factories: &[Arc<dyn BackendFactory>],
        config: &StackConfig,
    ) -> Result<Self, StackError> {
        let schema = Arc::new(schema);
        let tables = factories
            .iter()
            .map(|factory| {
                ObjectTable::open(
                    Arc::clone(&schema),
                    factory.as_ref(),
                    config.default_lifespan_secs,
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_tables(tables, config)
    }

    /// Compose already opened tables. All must share one schema.
    pub fn from_tables(tables: Vec<Arc<ObjectTable>>, config: &StackConfig) -> Result<Self, StackError> {
        let schema = match tables.first() {
            Some(first) => Arc::clone(first.schema()),
            None => {
                return Err(StackError::InvalidConfig(
                    "an object stack needs at least one table".to_string(),
                ))
            }
        };
        if let Some(other) = tables.iter().find(|t| t.schema() != &schema) {
            return Err(StackError::InvalidConfig(format!(
                "table '{}' does not share the schema of '{}'",
                other.table(),
                schema.table()
            )));
        }

        let query_layer = config.query_layer.index(tables.len());
        let stack = LayeredStack::new(schema.table(), tables, config)?;
        Ok(Self {
            schema,
            stack,
            query_layer,
        })
    }

    pub fn name(&self) -> &str {
        self.schema.table()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The underlying layered stack.
    pub fn stack(&self) -> &LayeredStack<ObjectTable> {
        &self.stack
    }

    pub fn layer(&self, index: usize) -> Option<&Arc<ObjectTable>> {
        self.stack.layer(index)
    }

    fn query_table(&self) -> Result<&Arc<ObjectTable>, StackError> {
        self.stack.layer(self.query_layer).ok_or_else(|| {
            StackError::InvalidConfig(format!("query layer {} does not exist", self.query_layer))
        })
    }

    /// Append fields to a record in every layer.
    ///
    /// With `id == None` a new identifier is generated. With an existing id
    /// the fields are merged into the current record (read through the
    /// layers) under the identifier's lock. Returns the id and the fields
    /// written.
    pub async fn append<I, K, V>(&self, id: Option<&str>, fields: I) -> Result<Record, StackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let patch = match id {
            Some("") => {
                return Err(StackError::SchemaViolation {
                    table: self.name().to_string(),
                    field: ID_FIELD.to_string(),
                    reason: "identifier must not be empty".to_string(),
                })
            }
            Some(id) => assemble(id.to_string(), fields),
            None => assemble(new_record_id(), fields),
        };
        self.schema.check_all(&patch.fields)?;

        if id.is_none() {
            self.stack.write(&patch.id, &patch).await?;
        } else {
            self.stack
                .update(&patch.id, |current| {
                    let mut record = current.unwrap_or_else(|| Record::new(patch.id.clone()));
                    record.merge(&patch);
                    record
                })
                .await?;
        }
        Ok(patch)
    }

    /// Replace a record in every layer.
    pub async fn put(&self, record: &Record) -> Result<(), StackError> {
        self.schema.check_all(&record.fields)?;
        self.stack.write(&record.id, record).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Record>, StackError> {
        self.stack.read(id).await
    }

    /// Remove a record from every layer. Absent ids are a no-op.
    pub async fn remove(&self, id: &str) -> Result<bool, StackError> {
        self.stack.remove(id).await
    }

    #[instrument(skip(self, query), fields(table = %self.name(), layer = self.query_layer))]
    pub async fn query_objects(&self, query: &Query) -> Result<Vec<Record>, StackError> {
        self.query_table()?.query_objects(query).await
    }

    /// WHERE / ORDER BY text form of [`ObjectStack::query_objects`].
    pub async fn query_where(
        &self,
        clause: Option<&str>,
        args: &[FieldValue],
        order_by: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Record>, StackError> {
        let query = build_query(clause, args, order_by, offset, limit)?;
        self.query_objects(&query).await
    }

    pub async fn query_count(&self, query: &Query) -> Result<usize, StackError> {
        self.query_table()?.query_count(query).await
    }

    pub async fn keys(&self) -> Result<std::collections::BTreeSet<String>, StackError> {
        self.query_table()?.keys().await
    }

    pub async fn with_field(&self, name: &str) -> Result<Vec<Record>, StackError> {
        self.query_table()?.with_field(name).await
    }

    pub async fn setup(&self) -> Result<(), StackError> {
        self.stack.setup().await
    }

    pub async fn teardown(&self) -> Result<(), StackError> {
        self.stack.teardown().await
    }

    pub async fn maintenance(&self) -> Result<(), StackError> {
        self.stack.maintenance().await
    }

    /// Returns whether the call escalated to full maintenance.
    pub async fn incremental_maintenance(&self) -> Result<bool, StackError> {
        self.stack.incremental_maintenance().await
    }

    pub async fn clear(&self) -> Result<(), StackError> {
        self.stack.clear().await
    }
}

#[async_trait]
impl Maintained for ObjectStack {
    fn label(&self) -> &str {
        self.name()
    }

    async fn apply(&self, op: LifecycleOp) -> Result<(), StackError> {
        self.stack.apply(op).await
    }
}
