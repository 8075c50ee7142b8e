// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//
// redb-backed persistent backend adapter for TierStore.
//
// Uses redb (pure Rust, B-tree, ACID, single-file database) to provide
// durable key-value maps. One database file holds many maps, one redb table
// per map name.
//
// # Design
//
// - `RedbFactory` owns the `Database`; every `RedbBackend` it opens shares it.
// - Stored values are `expiry (i64, big-endian) ++ payload`.
// - Read transactions for all read operations, write transactions for
//   put/remove/expiry changes (serialised by redb internally).
// - Blocking redb calls run on `spawn_blocking`.
// - Expired entries are hidden on read and deleted by `maintenance()`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use tracing::{debug, info};

use crate::backend::{is_expired, now_epoch_secs, BackendFactory, KeyValueBackend, Lifecycle};
use crate::error::StorageError;

const EXPIRY_LEN: usize = 8;

fn encode(value: &[u8], expiry: i64) -> Vec<u8> {
    let mut raw = Vec::with_capacity(EXPIRY_LEN + value.len());
    raw.extend_from_slice(&expiry.to_be_bytes());
    raw.extend_from_slice(value);
    raw
}

fn decode(raw: &[u8]) -> Result<(i64, Vec<u8>), StorageError> {
    if raw.len() < EXPIRY_LEN {
        return Err(StorageError::CorruptedData(format!(
            "stored value is {} bytes, shorter than the expiry header",
            raw.len()
        )));
    }
    let (header, payload) = raw.split_at(EXPIRY_LEN);
    let mut expiry = [0u8; EXPIRY_LEN];
    expiry.copy_from_slice(header);
    Ok((i64::from_be_bytes(expiry), payload.to_vec()))
}

/// Decode and keep only live values.
fn live(raw: &[u8], now: i64) -> Result<Option<(i64, Vec<u8>)>, StorageError> {
    let (expiry, value) = decode(raw)?;
    Ok((!is_expired(expiry, now)).then_some((expiry, value)))
}

async fn run_blocking<R, F>(f: F) -> Result<R, StorageError>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::BackendUnavailable(format!("task join: {e}")))?
}

/// Opens redb tables as backend maps inside one database file.
///
/// # Example
///
/// ```rust,no_run
/// use tierstore_storage::redb_backend::RedbFactory;
/// use tierstore_storage::backend::{BackendFactory, NEVER_EXPIRES};
///
/// # tokio_test::block_on(async {
/// let factory = RedbFactory::open("/tmp/tierstore-test.redb").unwrap();
/// let map = factory.open_map("users").unwrap();
/// map.setup().await.unwrap();
/// map.put("hello", b"world", NEVER_EXPIRES).await.unwrap();
/// assert_eq!(map.get("hello").await.unwrap(), Some(b"world".to_vec()));
/// # });
/// ```
pub struct RedbFactory {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbFactory {
    /// Open or create a redb database at the given path.
    ///
    /// Creates the file and parent directories if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::Io)?;
        }

        let db = Database::create(&path).map_err(|e| {
            StorageError::BackendUnavailable(format!(
                "failed to open redb at {}: {}",
                path.display(),
                e
            ))
        })?;

        debug!(path = %path.display(), "opened redb database");

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    /// Return the filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RedbFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbFactory").field("path", &self.path).finish()
    }
}

impl BackendFactory for RedbFactory {
    fn open_map(&self, name: &str) -> Result<Arc<dyn KeyValueBackend>, StorageError> {
        if name.is_empty() {
            return Err(StorageError::InvalidMapName {
                name: name.to_string(),
                reason: "redb table names cannot be empty".into(),
            });
        }
        Ok(Arc::new(RedbBackend {
            db: Arc::clone(&self.db),
            table: name.to_string(),
            label: format!("redb:{name}"),
        }))
    }

    fn name(&self) -> &str {
        "redb"
    }
}

/// One redb table exposed as a backend map.
///
/// Thread-safe: `Database` is `Send + Sync` and handles internal locking.
pub struct RedbBackend {
    db: Arc<Database>,
    table: String,
    label: String,
}

impl std::fmt::Debug for RedbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbBackend")
            .field("table", &self.table)
            .finish()
    }
}

impl RedbBackend {
    /// Run `f` against the table inside a write transaction and commit.
    async fn write<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> Result<R, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        run_blocking(move || {
            let def: TableDefinition<&'static str, &'static [u8]> = TableDefinition::new(&table);
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            let result = {
                let mut open = txn
                    .open_table(def)
                    .map_err(|e| StorageError::BackendUnavailable(format!("open table: {e}")))?;
                f(&mut open)?
            };
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(result)
        })
        .await
    }

    /// Run `f` against the table inside a read transaction. A table that has
    /// never been written reads as empty.
    async fn read<R, F>(&self, empty: R, f: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&redb::ReadOnlyTable<&'static str, &'static [u8]>) -> Result<R, StorageError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        run_blocking(move || {
            let def: TableDefinition<&'static str, &'static [u8]> = TableDefinition::new(&table);
            let txn = db
                .begin_read()
                .map_err(|e| StorageError::BackendUnavailable(format!("read txn: {e}")))?;
            let open = match txn.open_table(def) {
                Ok(t) => t,
                Err(TableError::TableDoesNotExist(_)) => return Ok(empty),
                Err(e) => return Err(StorageError::BackendUnavailable(format!("open table: {e}"))),
            };
            f(&open)
        })
        .await
    }
}

#[async_trait]
impl Lifecycle for RedbBackend {
    async fn setup(&self) -> Result<(), StorageError> {
        // Opening the table inside a write transaction creates it.
        self.write(|_| Ok(())).await?;
        debug!(table = %self.table, "redb table ready");
        Ok(())
    }

    async fn teardown(&self) -> Result<(), StorageError> {
        let db = Arc::clone(&self.db);
        let table = self.table.clone();
        run_blocking(move || {
            let def: TableDefinition<&'static str, &'static [u8]> = TableDefinition::new(&table);
            let txn = db
                .begin_write()
                .map_err(|e| StorageError::BackendUnavailable(format!("write txn: {e}")))?;
            txn.delete_table(def)
                .map_err(|e| StorageError::BackendUnavailable(format!("delete table: {e}")))?;
            txn.commit()
                .map_err(|e| StorageError::CorruptedData(format!("commit: {e}")))?;
            Ok(())
        })
        .await?;
        info!(table = %self.table, "redb table dropped");
        Ok(())
    }

    async fn maintenance(&self) -> Result<(), StorageError> {
        let reclaimed = self
            .write(|table| {
                let now = now_epoch_secs();
                let mut expired = Vec::new();
                for entry in table
                    .iter()
                    .map_err(|e| StorageError::CorruptedData(format!("iterate: {e}")))?
                {
                    let (k, v) =
                        entry.map_err(|e| StorageError::CorruptedData(format!("entry: {e}")))?;
                    let (expiry, _) = decode(v.value())?;
                    if is_expired(expiry, now) {
                        expired.push(k.value().to_string());
                    }
                }
                for key in &expired {
                    table
                        .remove(key.as_str())
                        .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
                }
                Ok(expired.len())
            })
            .await?;
        if reclaimed > 0 {
            debug!(table = %self.table, reclaimed, "maintenance reclaimed expired entries");
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.write(|table| {
            table
                .retain(|_, _| false)
                .map_err(|e| StorageError::CorruptedData(format!("clear: {e}")))
        })
        .await
    }
}

#[async_trait]
impl KeyValueBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();
        self.read(None, move |table| {
            match table
                .get(key.as_str())
                .map_err(|e| StorageError::CorruptedData(format!("get: {e}")))?
            {
                Some(raw) => Ok(live(raw.value(), now_epoch_secs())?.map(|(_, v)| v)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put(
        &self,
        key: &str,
        value: &[u8],
        expiry: i64,
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();
        let raw = encode(value, expiry);
        self.write(move |table| {
            let previous = table
                .insert(key.as_str(), raw.as_slice())
                .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
            match previous {
                Some(old) => Ok(live(old.value(), now_epoch_secs())?.map(|(_, v)| v)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let key = key.to_string();
        self.write(move |table| {
            let removed = table
                .remove(key.as_str())
                .map_err(|e| StorageError::CorruptedData(format!("remove: {e}")))?;
            match removed {
                Some(old) => Ok(live(old.value(), now_epoch_secs())?.map(|(_, v)| v)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn keys(&self, value_filter: Option<&[u8]>) -> Result<BTreeSet<String>, StorageError> {
        let filter = value_filter.map(<[u8]>::to_vec);
        self.read(BTreeSet::new(), move |table| {
            let now = now_epoch_secs();
            let mut keys = BTreeSet::new();
            for entry in table
                .iter()
                .map_err(|e| StorageError::CorruptedData(format!("iterate: {e}")))?
            {
                let (k, v) =
                    entry.map_err(|e| StorageError::CorruptedData(format!("entry: {e}")))?;
                if let Some((_, value)) = live(v.value(), now)? {
                    if filter.as_deref().map_or(true, |wanted| value == wanted) {
                        keys.insert(k.value().to_string());
                    }
                }
            }
            Ok(keys)
        })
        .await
    }

    async fn get_expiry(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let key = key.to_string();
        self.read(None, move |table| {
            match table
                .get(key.as_str())
                .map_err(|e| StorageError::CorruptedData(format!("get: {e}")))?
            {
                Some(raw) => Ok(live(raw.value(), now_epoch_secs())?.map(|(expiry, _)| expiry)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set_expiry(&self, key: &str, expiry: i64) -> Result<bool, StorageError> {
        let key = key.to_string();
        self.write(move |table| {
            let current = match table
                .get(key.as_str())
                .map_err(|e| StorageError::CorruptedData(format!("get: {e}")))?
            {
                Some(raw) => live(raw.value(), now_epoch_secs())?,
                None => None,
            };
            match current {
                Some((_, value)) => {
                    table
                        .insert(key.as_str(), encode(&value, expiry).as_slice())
                        .map_err(|e| StorageError::CorruptedData(format!("insert: {e}")))?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
        .await
    }

    fn name(&self) -> &str {
        &self.label
    }
}
