//! # Store Module
//!
//! Embedded, ordered key-value store on top of redb with named secondary
//! indices.
//!
//! Records live in a single `records` table as `&str -> &str` (JSON text).
//! Every index owns a table keyed by `(sort_key, primary_key)`, maintained
//! inside the same write transaction as the record it mirrors, so an aborted
//! transaction discards record and index changes together.
//!
//! ```rust,ignore
//! let store = Store::open("./data/fleet.redb", &[IndexSpec::json("battery", "drone:*", "batteryCapacity")])?;
//!
//! store.update(|tx| {
//!     tx.set("drone:SN1", r#"{"batteryCapacity":80}"#)?;
//!     Ok(())
//! })?;
//!
//! let fullest_first = store.view(|tx| tx.descend("battery"))?;
//! ```

pub mod index;

use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, Result};
pub use index::{IndexKind, IndexSpec, KeyPattern};

/// Primary records
const RECORDS: TableDefinition<&str, &str> = TableDefinition::new("records");

/// Index name -> JSON encoded [`IndexSpec`]
const INDEX_META: TableDefinition<&str, &str> = TableDefinition::new("index_meta");

type IndexKey = (&'static [u8], &'static str);

fn index_table(name: &str) -> TableDefinition<'_, IndexKey, ()> {
    TableDefinition::new(name)
}

/// A `(primary key, value)` pair returned by index scans.
pub type Entry = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexChange {
    Unchanged,
    Created,
    Rebuilt,
}

// =============================================================================
// STORE
// =============================================================================

/// Embedded store handle. Cheap to clone; clones share the database.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    indexes: Arc<RwLock<Arc<Vec<IndexSpec>>>>,
    location: String,
}

impl Store {
    /// Open the database file at `path`, creating it (and its parent
    /// directories) when missing, then declare `schema`.
    ///
    /// # Errors
    ///
    /// `Open` when the file cannot be created, locked or read.
    pub fn open(path: impl AsRef<Path>, schema: &[IndexSpec]) -> Result<Self> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let open_err = |reason: String| PersistenceError::Open {
            path: location.clone(),
            reason,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| open_err(e.to_string()))?;
            }
        }

        debug!(path = %location, "Opening store");
        let db = Database::create(path).map_err(|e| open_err(e.to_string()))?;
        Self::init(db, location, schema)
    }

    /// Volatile store backed by memory, for tests and dry runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialized.
    pub fn in_memory(schema: &[IndexSpec]) -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| PersistenceError::Open {
                path: ":memory:".to_string(),
                reason: e.to_string(),
            })?;
        Self::init(db, ":memory:".to_string(), schema)
    }

    fn init(db: Database, location: String, schema: &[IndexSpec]) -> Result<Self> {
        let store = Self {
            db: Arc::new(db),
            indexes: Arc::new(RwLock::new(Arc::new(Vec::new()))),
            location,
        };

        let txn = store.db.begin_write()?;
        txn.open_table(RECORDS)?;
        txn.open_table(INDEX_META)?;
        txn.commit()?;

        for spec in schema {
            store.create_index(spec.clone())?;
        }

        info!(
            path = %store.location,
            indexes = schema.len(),
            "Store opened"
        );
        Ok(store)
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Names of the indices registered on this handle.
    #[must_use]
    pub fn index_names(&self) -> Vec<String> {
        self.indexes.read().iter().map(|s| s.name.clone()).collect()
    }

    /// Register a secondary index. Re-issuing an identical definition is a
    /// no-op; a new or changed definition is (re)built from the records.
    ///
    /// # Errors
    ///
    /// Propagates storage failures; nothing is registered on error.
    pub fn create_index(&self, spec: IndexSpec) -> Result<()> {
        let encoded = serde_json::to_string(&spec)?;
        let table = spec.table_name();

        let txn = self.db.begin_write()?;
        let change = {
            let mut meta = txn.open_table(INDEX_META)?;
            let existing = meta.get(spec.name.as_str())?.map(|v| v.value().to_string());
            let change = match existing {
                Some(current) if current == encoded => IndexChange::Unchanged,
                Some(_) => IndexChange::Rebuilt,
                None => IndexChange::Created,
            };
            if change != IndexChange::Unchanged {
                meta.insert(spec.name.as_str(), encoded.as_str())?;
            }
            change
        };

        if change != IndexChange::Unchanged {
            if change == IndexChange::Rebuilt {
                txn.delete_table(index_table(&table))?;
            }
            let records = txn.open_table(RECORDS)?;
            let mut index = txn.open_table(index_table(&table))?;
            let mut entries = 0_usize;
            for row in records.iter()? {
                let (key, value) = row?;
                if spec.pattern.matches(key.value()) {
                    let sort_key = spec.sort_key(value.value());
                    index.insert((sort_key.as_slice(), key.value()), ())?;
                    entries += 1;
                }
            }
            info!(index = %spec.name, ?change, entries, "Index built");
        }

        // Writers snapshot the index list after taking the write lock, so the
        // list must be published before that lock is released.
        let mut registered = self.indexes.write();
        txn.commit()?;
        let mut specs: Vec<IndexSpec> = registered
            .iter()
            .filter(|s| s.name != spec.name)
            .cloned()
            .collect();
        specs.push(spec);
        *registered = Arc::new(specs);
        Ok(())
    }

    /// Run `f` in a read-only transaction.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a failure to begin the transaction.
    pub fn view<T>(&self, f: impl FnOnce(&ReadTx) -> Result<T>) -> Result<T> {
        let indexes = self.indexes.read().clone();
        let tx = ReadTx {
            txn: self.db.begin_read()?,
            indexes,
        };
        f(&tx)
    }

    /// Run `f` in a read-write transaction, committed when `f` returns `Ok`
    /// and aborted otherwise.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns, or a failure to begin or commit.
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTx) -> Result<T>) -> Result<T> {
        let txn = self.db.begin_write()?;
        let mut tx = WriteTx {
            txn,
            indexes: self.indexes.read().clone(),
        };

        match f(&mut tx) {
            Ok(value) => {
                tx.txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort) = tx.txn.abort() {
                    warn!(error = %abort, "Failed to abort transaction");
                }
                Err(err)
            }
        }
    }

    /// Point lookup in its own read transaction.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.view(|tx| tx.get(key))
    }

    /// Point write in its own transaction; returns the previous value.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn set(&self, key: &str, value: &str) -> Result<Option<String>> {
        self.update(|tx| tx.set(key, value))
    }

    /// Point delete in its own transaction; returns the removed value.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn delete(&self, key: &str) -> Result<String> {
        self.update(|tx| tx.delete(key))
    }
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Read-only transaction scope
pub struct ReadTx {
    txn: redb::ReadTransaction,
    indexes: Arc<Vec<IndexSpec>>,
}

impl ReadTx {
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.try_get(key)?
            .ok_or_else(|| PersistenceError::not_found("record", key))
    }

    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn try_get(&self, key: &str) -> Result<Option<String>> {
        lookup(&self.txn.open_table(RECORDS)?, key)
    }

    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.try_get(key)?.is_some())
    }

    /// Entries of `index` in ascending sort-key order.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for an unregistered index.
    pub fn ascend(&self, index: &str) -> Result<Vec<Entry>> {
        self.scan(index, false)
    }

    /// Entries of `index` in descending sort-key order; ties stay in
    /// ascending key order.
    ///
    /// # Errors
    ///
    /// `InvalidQuery` for an unregistered index.
    pub fn descend(&self, index: &str) -> Result<Vec<Entry>> {
        self.scan(index, true)
    }

    fn scan(&self, index: &str, descending: bool) -> Result<Vec<Entry>> {
        let table = registered_table(&self.indexes, index)?;
        let records = self.txn.open_table(RECORDS)?;
        let entries = self.txn.open_table(index_table(&table))?;
        scan_index(&records, &entries, descending)
    }
}

/// Read-write transaction scope
pub struct WriteTx {
    txn: redb::WriteTransaction,
    indexes: Arc<Vec<IndexSpec>>,
}

impl WriteTx {
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn get(&self, key: &str) -> Result<String> {
        self.try_get(key)?
            .ok_or_else(|| PersistenceError::not_found("record", key))
    }

    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn try_get(&self, key: &str) -> Result<Option<String>> {
        lookup(&self.txn.open_table(RECORDS)?, key)
    }

    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.try_get(key)?.is_some())
    }

    /// # Errors
    ///
    /// `InvalidQuery` for an unregistered index.
    pub fn ascend(&self, index: &str) -> Result<Vec<Entry>> {
        self.scan(index, false)
    }

    /// # Errors
    ///
    /// `InvalidQuery` for an unregistered index.
    pub fn descend(&self, index: &str) -> Result<Vec<Entry>> {
        self.scan(index, true)
    }

    fn scan(&self, index: &str, descending: bool) -> Result<Vec<Entry>> {
        let table = registered_table(&self.indexes, index)?;
        let records = self.txn.open_table(RECORDS)?;
        let entries = self.txn.open_table(index_table(&table))?;
        scan_index(&records, &entries, descending)
    }

    /// Insert or replace `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn set(&mut self, key: &str, value: &str) -> Result<Option<String>> {
        let previous = {
            let mut records = self.txn.open_table(RECORDS)?;
            let previous = records.insert(key, value)?.map(|v| v.value().to_string());
            previous
        };
        self.reindex(key, previous.as_deref(), Some(value))?;
        debug!(key, replaced = previous.is_some(), "Record written");
        Ok(previous)
    }

    /// Remove `key`, returning the removed value.
    ///
    /// # Errors
    ///
    /// `NotFound` if the key is absent.
    pub fn delete(&mut self, key: &str) -> Result<String> {
        let previous = {
            let mut records = self.txn.open_table(RECORDS)?;
            let previous = records.remove(key)?.map(|v| v.value().to_string());
            previous
        }
        .ok_or_else(|| PersistenceError::not_found("record", key))?;
        self.reindex(key, Some(&previous), None)?;
        debug!(key, "Record deleted");
        Ok(previous)
    }

    fn reindex(&self, key: &str, old: Option<&str>, new: Option<&str>) -> Result<()> {
        for spec in self.indexes.iter().filter(|s| s.pattern.matches(key)) {
            let mut entries = self.txn.open_table(index_table(&spec.table_name()))?;
            if let Some(old) = old {
                entries.remove((spec.sort_key(old).as_slice(), key))?;
            }
            if let Some(new) = new {
                entries.insert((spec.sort_key(new).as_slice(), key), ())?;
            }
        }
        Ok(())
    }
}

fn registered_table(indexes: &[IndexSpec], name: &str) -> Result<String> {
    indexes
        .iter()
        .find(|s| s.name == name)
        .map(IndexSpec::table_name)
        .ok_or_else(|| PersistenceError::InvalidQuery(format!("unknown index '{name}'")))
}

fn lookup(records: &impl ReadableTable<&'static str, &'static str>, key: &str) -> Result<Option<String>> {
    Ok(records.get(key)?.map(|v| v.value().to_string()))
}

fn scan_index(
    records: &impl ReadableTable<&'static str, &'static str>,
    entries: &impl ReadableTable<IndexKey, ()>,
    descending: bool,
) -> Result<Vec<Entry>> {
    let mut keys: Vec<(Vec<u8>, String)> = Vec::new();
    for row in entries.iter()? {
        let (entry, _) = row?;
        let (sort_key, primary) = entry.value();
        keys.push((sort_key.to_vec(), primary.to_string()));
    }

    if descending {
        keys = keys
            .chunk_by(|a, b| a.0 == b.0)
            .rev()
            .flatten()
            .cloned()
            .collect();
    }

    let mut out = Vec::with_capacity(keys.len());
    for (_, primary) in keys {
        if let Some(value) = lookup(records, &primary)? {
            out.push((primary, value));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery_schema() -> Vec<IndexSpec> {
        vec![
            IndexSpec::json("battery", "drone:*", "batteryCapacity"),
            IndexSpec::string("config", "config"),
        ]
    }

    fn drone_json(battery: f64) -> String {
        format!(r#"{{"batteryCapacity":{battery}}}"#)
    }

    fn keys(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_point_operations() {
        let store = Store::in_memory(&battery_schema()).unwrap();

        assert!(store.get("drone:A").unwrap_err().is_not_found());
        assert_eq!(store.set("drone:A", &drone_json(10.0)).unwrap(), None);
        assert_eq!(
            store.set("drone:A", &drone_json(20.0)).unwrap(),
            Some(drone_json(10.0))
        );
        assert_eq!(store.get("drone:A").unwrap(), drone_json(20.0));
        assert_eq!(store.delete("drone:A").unwrap(), drone_json(20.0));
        assert!(store.delete("drone:A").unwrap_err().is_not_found());
    }

    #[test]
    fn test_descending_with_ties_in_key_order() {
        let store = Store::in_memory(&battery_schema()).unwrap();
        store
            .update(|tx| {
                tx.set("drone:C", &drone_json(50.0))?;
                tx.set("drone:A", &drone_json(25.0))?;
                tx.set("drone:B", &drone_json(25.0))?;
                tx.set("drone:D", &drone_json(99.2))?;
                tx.set("med:X", r#"{"weight":10}"#)?;
                Ok(())
            })
            .unwrap();

        let desc = store.view(|tx| tx.descend("battery")).unwrap();
        assert_eq!(keys(&desc), vec!["drone:D", "drone:C", "drone:A", "drone:B"]);

        let asc = store.view(|tx| tx.ascend("battery")).unwrap();
        assert_eq!(keys(&asc), vec!["drone:A", "drone:B", "drone:C", "drone:D"]);
    }

    #[test]
    fn test_index_follows_updates_and_deletes() {
        let store = Store::in_memory(&battery_schema()).unwrap();
        store.set("drone:A", &drone_json(90.0)).unwrap();
        store.set("drone:B", &drone_json(50.0)).unwrap();
        store.set("drone:A", &drone_json(10.0)).unwrap();

        let desc = store.view(|tx| tx.descend("battery")).unwrap();
        assert_eq!(keys(&desc), vec!["drone:B", "drone:A"]);

        store.delete("drone:B").unwrap();
        let desc = store.view(|tx| tx.descend("battery")).unwrap();
        assert_eq!(keys(&desc), vec!["drone:A"]);
    }

    #[test]
    fn test_failed_update_discards_records_and_index_entries() {
        let store = Store::in_memory(&battery_schema()).unwrap();
        store.set("drone:A", &drone_json(40.0)).unwrap();

        let result: Result<()> = store.update(|tx| {
            tx.set("drone:A", &drone_json(80.0))?;
            tx.set("drone:B", &drone_json(60.0))?;
            Err(PersistenceError::WriteConflict("boom".into()))
        });
        assert!(matches!(result, Err(PersistenceError::WriteConflict(_))));

        assert_eq!(store.get("drone:A").unwrap(), drone_json(40.0));
        assert!(store.get("drone:B").unwrap_err().is_not_found());
        let desc = store.view(|tx| tx.descend("battery")).unwrap();
        assert_eq!(keys(&desc), vec!["drone:A"]);
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        let store = Store::in_memory(&battery_schema()).unwrap();
        let err = store.view(|tx| tx.ascend("nope")).unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidQuery(_)));
    }

    #[test]
    fn test_create_index_is_idempotent_and_backfills() {
        let store = Store::in_memory(&[]).unwrap();
        store.set("med:A", r#"{"weight":30}"#).unwrap();
        store.set("med:B", r#"{"weight":700}"#).unwrap();

        let spec = IndexSpec::json("weight", "med:*", "weight");
        store.create_index(spec.clone()).unwrap();
        store.create_index(spec).unwrap();
        assert_eq!(store.index_names(), vec!["weight".to_string()]);

        let desc = store.view(|tx| tx.descend("weight")).unwrap();
        assert_eq!(keys(&desc), vec!["med:B", "med:A"]);
    }

    #[test]
    fn test_writes_racing_index_creation_are_indexed() {
        let store = Store::in_memory(&[]).unwrap();

        std::thread::scope(|scope| {
            let writer = store.clone();
            scope.spawn(move || {
                for i in 0..200 {
                    writer
                        .set(&format!("med:{i:03}"), &format!(r#"{{"weight":{i}}}"#))
                        .unwrap();
                }
            });
            store
                .create_index(IndexSpec::json("weight", "med:*", "weight"))
                .unwrap();
        });

        let asc = store.view(|tx| tx.ascend("weight")).unwrap();
        assert_eq!(asc.len(), 200);
        assert_eq!(asc[0].0, "med:000");
        assert_eq!(asc[199].0, "med:199");
    }

    #[test]
    fn test_changed_index_definition_is_rebuilt() {
        let store = Store::in_memory(&[IndexSpec::json("by", "med:*", "weight")]).unwrap();
        store.set("med:A", r#"{"weight":30,"rank":2}"#).unwrap();
        store.set("med:B", r#"{"weight":700,"rank":1}"#).unwrap();

        store
            .create_index(IndexSpec::json("by", "med:*", "rank"))
            .unwrap();
        let asc = store.view(|tx| tx.ascend("by")).unwrap();
        assert_eq!(keys(&asc), vec!["med:B", "med:A"]);
    }

    #[test]
    fn test_numeric_pattern_covers_legacy_keys_only() {
        let spec = IndexSpec::json("users", "*", "username").with_pattern(KeyPattern::Numeric);
        let store = Store::in_memory(&[spec]).unwrap();
        store.set("1", r#"{"username":"b"}"#).unwrap();
        store.set("0", r#"{"username":"a"}"#).unwrap();
        store.set("config", r#"{"isPopulated":true}"#).unwrap();

        let asc = store.view(|tx| tx.ascend("users")).unwrap();
        assert_eq!(keys(&asc), vec!["0", "1"]);
    }

    #[test]
    fn test_open_creates_file_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("fleet.redb");

        {
            let store = Store::open(&path, &battery_schema()).unwrap();
            store.set("drone:A", &drone_json(70.0)).unwrap();
        }
        assert!(path.exists());

        let store = Store::open(&path, &battery_schema()).unwrap();
        assert_eq!(store.get("drone:A").unwrap(), drone_json(70.0));
        let desc = store.view(|tx| tx.descend("battery")).unwrap();
        assert_eq!(keys(&desc), vec!["drone:A"]);
    }
}
