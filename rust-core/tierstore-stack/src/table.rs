// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! Object tables.
//!
//! An [`ObjectTable`] stores each declared field in its own backend map
//! (`<table>#<field>`, keyed by record id) plus an index map
//! (`<table>#_oid`) of known identifiers. Table names cannot contain `#`
//! and no field may be called `_oid`, so map names never collide.
//!
//! Columns are independent: a write touching several fields is not atomic
//! across them, and a reader may observe some fields of a concurrent write
//! before others.
//!
//! Queries are full scans: every known identifier is materialised and
//! filtered through the query's condition tree.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use tierstore_query::{normalize_field, FieldValue, OrderBy, Query, Record, ID_FIELD};
use tierstore_storage::{expiry_after, BackendFactory, KeyValueBackend, TypedMap, NEVER_EXPIRES};

use crate::error::{LayerFailure, StackError};
use crate::layer::StackLayer;
use crate::maintenance::{LifecycleOp, Maintained, MaintenanceCoordinator};
use crate::schema::Schema;

const INDEX_MARKER: &[u8] = b"1";

/// Generate a fresh record identifier.
pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build a record from caller-supplied field pairs.
pub(crate) fn assemble<I, K, V>(id: String, fields: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<FieldValue>,
{
    let mut record = Record::new(id);
    for (name, value) in fields {
        record.set(name.as_ref(), value);
    }
    record
}

/// Name of the backend map holding `suffix` for `table`.
pub fn map_name(table: &str, suffix: &str) -> String {
    format!("{}#{}", table.to_ascii_lowercase(), suffix)
}

/// The sooner of two expiry timestamps, [`NEVER_EXPIRES`] being latest.
fn earliest(a: i64, b: i64) -> i64 {
    match (a, b) {
        (NEVER_EXPIRES, other) | (other, NEVER_EXPIRES) => other,
        (a, b) => a.min(b),
    }
}

/// A typed, queryable collection of records over per-field backend maps.
pub struct ObjectTable {
    label: String,
    schema: Arc<Schema>,
    index: Arc<dyn KeyValueBackend>,
    columns: BTreeMap<String, TypedMap<FieldValue, dyn KeyValueBackend>>,
    maps: MaintenanceCoordinator<dyn KeyValueBackend>,
    lifespan_secs: u64,
}

impl ObjectTable {
    /// Open the index and column maps for `schema` on `factory`.
    ///
    /// Does not set anything up; call [`ObjectTable::setup`] before use.
    pub fn open(
        schema: Arc<Schema>,
        factory: &dyn BackendFactory,
        lifespan_secs: u64,
    ) -> Result<Self, StackError> {
        let index = factory.open_map(&map_name(schema.table(), ID_FIELD))?;
        let mut maps = vec![Arc::clone(&index)];
        let mut columns = BTreeMap::new();
        for field in schema.fields().keys() {
            let backend = factory.open_map(&map_name(schema.table(), field))?;
            maps.push(Arc::clone(&backend));
            columns.insert(field.clone(), TypedMap::new(backend));
        }

        Ok(Self {
            label: format!("{}:{}", factory.name(), schema.table()),
            schema,
            index,
            columns,
            maps: MaintenanceCoordinator::new(maps),
            lifespan_secs,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// Append fields to a record, creating it (with a generated id when
    /// `id` is `None`) if it does not exist. Fields not mentioned are left
    /// untouched. Returns the written id and fields.
    pub async fn append<I, K, V>(&self, id: Option<&str>, fields: I) -> Result<Record, StackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        self.append_expiring(id, fields, expiry_after(self.lifespan_secs))
            .await
    }

    /// [`ObjectTable::append`] with an explicit expiry timestamp.
    pub async fn append_expiring<I, K, V>(
        &self,
        id: Option<&str>,
        fields: I,
        expiry: i64,
    ) -> Result<Record, StackError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<FieldValue>,
    {
        let id = match id {
            Some(id) => self.check_id(id)?.to_string(),
            None => new_record_id(),
        };
        let record = assemble(id, fields);
        self.schema.check_all(&record.fields)?;

        self.index.put(&record.id, INDEX_MARKER, expiry).await?;
        for (name, value) in &record.fields {
            if let Some(column) = self.columns.get(name) {
                column.put(&record.id, value, expiry).await?;
            }
        }
        debug!(table = %self.table(), id = %record.id, fields = record.fields.len(), "appended");
        Ok(record)
    }

    /// Replace a record: declared fields absent from `record` are removed.
    #[instrument(skip(self, record), fields(table = %self.table(), id = %record.id))]
    pub async fn put(&self, record: &Record, expiry: i64) -> Result<(), StackError> {
        self.check_id(&record.id)?;
        self.schema.check_all(&record.fields)?;

        self.index.put(&record.id, INDEX_MARKER, expiry).await?;
        for (name, column) in &self.columns {
            match record.fields.get(name) {
                Some(value) => {
                    column.put(&record.id, value, expiry).await?;
                }
                None => {
                    column.remove(&record.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Materialise a record. Absent when the id is neither indexed nor has a
    /// value in any column.
    pub async fn get(&self, id: &str) -> Result<Option<Record>, StackError> {
        let indexed = self.index.get(id).await?.is_some();
        let mut record = Record::new(id);
        for (name, column) in &self.columns {
            if let Some(value) = column.get(id).await? {
                record.fields.insert(name.clone(), value);
            }
        }
        Ok((indexed || !record.is_blank()).then_some(record))
    }

    /// [`ObjectTable::get`] plus the earliest expiry among the record's
    /// live entries, or [`NEVER_EXPIRES`] if none of them expire.
    pub async fn get_with_expiry(&self, id: &str) -> Result<Option<(Record, i64)>, StackError> {
        let mut expiry = NEVER_EXPIRES;
        let index_expiry = self.index.get_expiry(id).await?;
        if let Some(at) = index_expiry {
            expiry = earliest(expiry, at);
        }

        let mut record = Record::new(id);
        for (name, column) in &self.columns {
            let Some(value) = column.get(id).await? else {
                continue;
            };
            // Expired between the two reads: treat as absent.
            if let Some(at) = column.backend().get_expiry(id).await? {
                expiry = earliest(expiry, at);
                record.fields.insert(name.clone(), value);
            }
        }
        Ok((index_expiry.is_some() || !record.is_blank()).then_some((record, expiry)))
    }

    pub async fn contains(&self, id: &str) -> Result<bool, StackError> {
        Ok(self.get(id).await?.is_some())
    }

    /// Delete `id` from the index and every column. Every map is attempted;
    /// failures are reported together as `PartialLayerFailure`, indexed by
    /// map (the index map first). Returns whether anything was removed.
    #[instrument(skip(self), fields(table = %self.table()))]
    pub async fn remove(&self, id: &str) -> Result<bool, StackError> {
        let maps = self.maps.members();
        let mut removed = false;
        let mut failures = Vec::new();
        for (index, map) in maps.iter().enumerate() {
            match map.remove(id).await {
                Ok(previous) => removed |= previous.is_some(),
                Err(err) => {
                    warn!(table = %self.table(), map = map.name(), error = %err, "remove failed");
                    failures.push(LayerFailure::new(index, map.name(), err.into()));
                }
            }
        }
        if failures.is_empty() {
            Ok(removed)
        } else {
            Err(StackError::PartialLayerFailure {
                operation: "remove".to_string(),
                attempted: maps.len(),
                failures,
            })
        }
    }

    /// Every known identifier, including records whose index entry has gone
    /// but which still hold field values.
    pub async fn keys(&self) -> Result<BTreeSet<String>, StackError> {
        let mut keys = self.index.keys(None).await?;
        for column in self.columns.values() {
            keys.extend(column.keys(None).await?);
        }
        Ok(keys)
    }

    /// Records that carry a value for the declared field `name`.
    pub async fn with_field(&self, name: &str) -> Result<Vec<Record>, StackError> {
        self.schema.require(name)?;
        let ids = match self.columns.get(&normalize_field(name)) {
            Some(column) => column.keys(None).await?,
            None => BTreeSet::new(),
        };
        self.materialise(ids).await
    }

    /// Scan, filter, order and window.
    #[instrument(skip(self, query), fields(table = %self.table()))]
    pub async fn query_objects(&self, query: &Query) -> Result<Vec<Record>, StackError> {
        let matched = self.scan(query).await?;
        Ok(query.finish(matched))
    }

    /// Number of records passing the query's filter. Offset and limit are
    /// ignored.
    pub async fn query_count(&self, query: &Query) -> Result<usize, StackError> {
        Ok(self.scan(query).await?.len())
    }

    /// [`ObjectTable::query_objects`] from WHERE and ORDER BY text. A `None`
    /// clause selects every record.
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

    pub async fn setup(&self) -> Result<(), StackError> {
        self.apply(LifecycleOp::Setup).await
    }

    pub async fn teardown(&self) -> Result<(), StackError> {
        self.apply(LifecycleOp::Teardown).await
    }

    pub async fn maintenance(&self) -> Result<(), StackError> {
        self.apply(LifecycleOp::Maintenance).await
    }

    pub async fn incremental_maintenance(&self) -> Result<(), StackError> {
        self.apply(LifecycleOp::IncrementalMaintenance).await
    }

    pub async fn clear(&self) -> Result<(), StackError> {
        self.apply(LifecycleOp::Clear).await
    }

    async fn scan(&self, query: &Query) -> Result<Vec<Record>, StackError> {
        let records = self.materialise(self.keys().await?).await?;
        Ok(records.into_iter().filter(|r| query.matches(r)).collect())
    }

    async fn materialise(&self, ids: BTreeSet<String>) -> Result<Vec<Record>, StackError> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            // Skip records removed between listing and reading.
            if let Some(record) = self.get(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn check_id<'a>(&self, id: &'a str) -> Result<&'a str, StackError> {
        if id.is_empty() {
            return Err(StackError::SchemaViolation {
                table: self.table().to_string(),
                field: tierstore_query::ID_FIELD.to_string(),
                reason: "identifier must not be empty".to_string(),
            });
        }
        Ok(id)
    }
}

/// Compile optional WHERE and ORDER BY text into a [`Query`].
pub fn build_query(
    clause: Option<&str>,
    args: &[FieldValue],
    order_by: Option<&str>,
    offset: usize,
    limit: usize,
) -> Result<Query, StackError> {
    let mut query = match clause.map(str::trim).filter(|c| !c.is_empty()) {
        Some(clause) => Query::parse(clause, args)?,
        None => Query::all(),
    };
    if let Some(order) = order_by.map(str::trim).filter(|o| !o.is_empty()) {
        query = query.ordered(order.parse::<OrderBy>()?);
    }
    Ok(query.offset(offset).limit(limit))
}

#[async_trait]
impl Maintained for ObjectTable {
    fn label(&self) -> &str {
        &self.label
    }

    async fn apply(&self, op: LifecycleOp) -> Result<(), StackError> {
        if matches!(op, LifecycleOp::Setup | LifecycleOp::Teardown | LifecycleOp::Clear) {
            info!(table = %self.label, maps = self.maps.members().len(), "{}", op);
        }
        self.maps.run(op).await
    }
}

#[async_trait]
impl StackLayer for ObjectTable {
    type Value = Record;

    async fn fetch(&self, id: &str) -> Result<Option<(Record, i64)>, StackError> {
        self.get_with_expiry(id).await
    }

    async fn store(&self, id: &str, value: &Record, expiry: i64) -> Result<(), StackError> {
        if value.id == id {
            self.put(value, expiry).await
        } else {
            let mut renamed = value.clone();
            renamed.id = id.to_string();
            self.put(&renamed, expiry).await
        }
    }

    async fn discard(&self, id: &str) -> Result<bool, StackError> {
        self.remove(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use tierstore_query::{ArgMap, Condition, FieldType};
    use tierstore_storage::{now_epoch_secs, InMemoryFactory, Lifecycle, StorageError};

    /// Every call fails.
    struct Unreachable(String);

    impl Unreachable {
        fn fail<T>(&self) -> Result<T, StorageError> {
            Err(StorageError::BackendUnavailable(format!("{} is unreachable", self.0)))
        }
    }

    #[async_trait]
    impl Lifecycle for Unreachable {
        async fn setup(&self) -> Result<(), StorageError> {
            self.fail()
        }
        async fn teardown(&self) -> Result<(), StorageError> {
            self.fail()
        }
        async fn maintenance(&self) -> Result<(), StorageError> {
            self.fail()
        }
        async fn clear(&self) -> Result<(), StorageError> {
            self.fail()
        }
    }

    #[async_trait]
    impl KeyValueBackend for Unreachable {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.fail()
        }
        async fn put(&self, _key: &str, _value: &[u8], _expiry: i64) -> Result<Option<Vec<u8>>, StorageError> {
            self.fail()
        }
        async fn remove(&self, _key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.fail()
        }
        async fn keys(&self, _filter: Option<&[u8]>) -> Result<BTreeSet<String>, StorageError> {
            self.fail()
        }
        async fn get_expiry(&self, _key: &str) -> Result<Option<i64>, StorageError> {
            self.fail()
        }
        async fn set_expiry(&self, _key: &str, _expiry: i64) -> Result<bool, StorageError> {
            self.fail()
        }
        fn name(&self) -> &str {
            &self.0
        }
    }

    struct UnreachableFactory;

    impl BackendFactory for UnreachableFactory {
        fn open_map(&self, name: &str) -> Result<Arc<dyn KeyValueBackend>, StorageError> {
            Ok(Arc::new(Unreachable(name.to_string())))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::new("Items")
                .unwrap()
                .with_field("num", FieldType::Integer)
                .unwrap()
                .with_field("str_val", FieldType::String)
                .unwrap(),
        )
    }

    async fn table() -> ObjectTable {
        let table = ObjectTable::open(schema(), &InMemoryFactory::new(), 0).unwrap();
        table.setup().await.unwrap();
        table
    }

    fn fv(value: impl Into<FieldValue>) -> FieldValue {
        value.into()
    }

    #[tokio::test]
    async fn test_append_generates_id_and_get_round_trips() {
        let table = table().await;
        let written = table
            .append(None, [("num", fv(1)), ("STR_VAL", fv("this"))])
            .await
            .unwrap();
        assert!(!written.id.is_empty());

        let read = table.get(&written.id).await.unwrap().unwrap();
        assert_eq!(read, written);
        assert_eq!(read.field("str_val").as_deref(), Some(&fv("this")));
    }

    #[tokio::test]
    async fn test_append_merges_into_existing_record() {
        let table = table().await;
        table.append(Some("r1"), [("num", fv(1))]).await.unwrap();
        table.append(Some("r1"), [("str_val", fv("x"))]).await.unwrap();
        let record = table.get("r1").await.unwrap().unwrap();
        assert_eq!(record.fields.len(), 2);
    }

    #[tokio::test]
    async fn test_put_replaces_record() {
        let table = table().await;
        table
            .append(Some("r1"), [("num", fv(1)), ("str_val", fv("x"))])
            .await
            .unwrap();
        table
            .put(&Record::new("r1").with("num", 2), NEVER_EXPIRES)
            .await
            .unwrap();
        let record = table.get("r1").await.unwrap().unwrap();
        assert_eq!(record, Record::new("r1").with("num", 2));
    }

    #[tokio::test]
    async fn test_undeclared_field_rejected_before_any_write() {
        let table = table().await;
        let err = table
            .append(Some("r1"), [("num", fv(1)), ("colour", fv("red"))])
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::SchemaViolation { ref field, .. } if field == "colour"));
        assert!(table.get("r1").await.unwrap().is_none());
        assert!(table.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_rejected() {
        let table = table().await;
        let err = table.append(None, [("num", fv("one"))]).await.unwrap_err();
        assert!(matches!(err, StackError::SchemaViolation { .. }));
        let err = table.append(Some(""), [("num", fv(1))]).await.unwrap_err();
        assert!(matches!(err, StackError::SchemaViolation { ref field, .. } if field == "_oid"));
    }

    #[tokio::test]
    async fn test_blank_record_exists() {
        let table = table().await;
        let blank = table
            .append(None, Vec::<(&str, FieldValue)>::new())
            .await
            .unwrap();
        let read = table.get(&blank.id).await.unwrap().unwrap();
        assert!(read.is_blank());
        assert!(table.contains(&blank.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let table = table().await;
        table.append(Some("r1"), [("num", fv(1))]).await.unwrap();
        assert!(table.remove("r1").await.unwrap());
        assert!(!table.remove("r1").await.unwrap());
        assert!(!table.remove("never-existed").await.unwrap());
        assert!(table.get("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remove_reports_every_failed_map() {
        let table = ObjectTable::open(schema(), &UnreachableFactory, 0).unwrap();
        match table.remove("r1").await.unwrap_err() {
            StackError::PartialLayerFailure {
                operation,
                attempted,
                failures,
            } => {
                assert_eq!(operation, "remove");
                assert_eq!(attempted, 3);
                let names: Vec<_> = failures.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["items#_oid", "items#num", "items#str_val"]);
                assert_eq!(
                    failures.iter().map(|f| f.layer).collect::<Vec<_>>(),
                    vec![0, 1, 2]
                );
            }
            other => panic!("expected PartialLayerFailure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_with_expiry_reports_earliest() {
        let table = table().await;
        let soon = now_epoch_secs() + 600;
        table
            .append_expiring(Some("r1"), [("num", fv(1))], NEVER_EXPIRES)
            .await
            .unwrap();
        table
            .append_expiring(Some("r1"), [("str_val", fv("x"))], soon)
            .await
            .unwrap();
        table.append(Some("r2"), [("num", fv(2))]).await.unwrap();

        let (record, expiry) = table.get_with_expiry("r1").await.unwrap().unwrap();
        assert_eq!(record.fields.len(), 2);
        assert_eq!(expiry, soon);
        let (_, expiry) = table.get_with_expiry("r2").await.unwrap().unwrap();
        assert_eq!(expiry, NEVER_EXPIRES);
        assert!(table.get_with_expiry("r3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_field() {
        let table = table().await;
        table.append(Some("a"), [("num", fv(1))]).await.unwrap();
        table.append(Some("b"), [("str_val", fv("x"))]).await.unwrap();
        let with_num = table.with_field("NUM").await.unwrap();
        assert_eq!(with_num.len(), 1);
        assert_eq!(with_num[0].id, "a");
        assert!(matches!(
            table.with_field("nope").await,
            Err(StackError::SchemaViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_objects_filters_and_counts() {
        let table = table().await;
        for n in 1..=5 {
            table.append(None, [("num", fv(n))]).await.unwrap();
        }
        let query = Query::filter(Condition::ge("num", "min"), ArgMap::new().bind("min", 4));
        assert_eq!(table.query_count(&query).await.unwrap(), 2);

        let all = table
            .query_where(None, &[], Some("num DESC"), 0, 0)
            .await
            .unwrap();
        let nums: Vec<_> = all
            .iter()
            .filter_map(|r| r.field("num").map(|v| v.into_owned()))
            .collect();
        assert_eq!(nums, (1..=5).rev().map(|n| fv(n)).collect::<Vec<_>>());

        assert!(matches!(
            table.query_where(Some("num >"), &[], None, 0, 0).await,
            Err(StackError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_fields_vanish_and_maintenance_reclaims() {
        let table = table().await;
        let past = now_epoch_secs() - 10;
        table
            .append_expiring(Some("old"), [("num", fv(1))], past)
            .await
            .unwrap();
        table.append(Some("new"), [("num", fv(2))]).await.unwrap();

        assert!(table.get("old").await.unwrap().is_none());
        table.maintenance().await.unwrap();
        assert_eq!(
            table.keys().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["new".to_string()]
        );
    }

    #[tokio::test]
    async fn test_clear_keeps_table_usable() {
        let table = table().await;
        table.append(Some("r1"), [("num", fv(1))]).await.unwrap();
        table.clear().await.unwrap();
        assert!(table.keys().await.unwrap().is_empty());
        table.append(Some("r2"), [("num", fv(2))]).await.unwrap();
        assert!(table.contains("r2").await.unwrap());
    }

    #[test]
    fn test_map_names() {
        assert_eq!(map_name("Items", ID_FIELD), "items#_oid");
        assert_eq!(map_name("Items", "num[0].val"), "items#num[0].val");
        // A table name cannot contain '#', so prefixes never overlap.
        assert_ne!(map_name("a", "b__c"), map_name("a__b", "c"));
    }
}
