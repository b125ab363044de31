//! In-Memory Storage
//!
//! [`InMemoryStorage`] implements the storage contract on top of a
//! [`StorageEngine`]. Nothing survives the process unless it is explicitly
//! backed up.
//!
//! ## Weak spots
//!
//! - `compare_and_set` writes unconditionally and reports success unless
//!   [`StorageConfig::strict_compare_and_set`] is enabled.
//! - `do_in_transaction` loads, runs the callback with no lock held, then
//!   stores. A concurrent write to the same key in between is overwritten.
//! - TTLs surface as whole seconds rounded up, so a transaction that leaves
//!   `ttl` alone re-arms the expiry from the rounded value.

mod config;

pub use config::StorageConfig;

use crate::contract::{ManagedStorage, RawEntry, Storage, NO_TTL};
use crate::error::{Result, StorageError};
use crate::storage::{namespace_key, Entry, ExpirySweeper, StorageEngine};
use bytes::Bytes;
use std::any::Any;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A volatile, process-local storage instance.
///
/// # Example
///
/// ```
/// use memstore::{InMemoryStorage, Storage, StorageConfig};
/// use bytes::Bytes;
///
/// let storage = InMemoryStorage::open("cache", StorageConfig::default().without_cleanup()).unwrap();
/// storage.set(b"user:", b"1", Bytes::from("Alice"), 0).unwrap();
///
/// let value = storage.get(b"user:", b"1", true).unwrap();
/// assert_eq!(value, Some(Bytes::from("Alice")));
/// ```
#[derive(Debug)]
pub struct InMemoryStorage {
    name: String,
    engine: Arc<StorageEngine>,
    sweeper: Option<ExpirySweeper>,
    strict_compare_and_set: bool,
    /// False for instances wrapping a caller's table
    owns_table: bool,
}

impl InMemoryStorage {
    /// Opens a new, empty instance and starts its expiry sweeper.
    pub fn open(name: impl Into<String>, config: StorageConfig) -> Result<Self> {
        let name = name.into();
        let engine = Arc::new(StorageEngine::with_default_ttl(config.default_expiration));

        let sweeper = config
            .effective_cleanup_interval()
            .map(|interval| ExpirySweeper::start(Arc::clone(&engine), interval))
            .transpose()?;

        info!(
            name = %name,
            default_expiration = ?config.default_expiration,
            cleanup_interval = ?config.effective_cleanup_interval(),
            strict_compare_and_set = config.strict_compare_and_set,
            "In-memory storage opened"
        );

        Ok(Self {
            name,
            engine,
            sweeper,
            strict_compare_and_set: config.strict_compare_and_set,
            owns_table: true,
        })
    }

    /// Opens a new instance with the default configuration.
    pub fn new_default(name: impl Into<String>) -> Result<Self> {
        Self::open(name, StorageConfig::default())
    }

    /// Wraps an existing table. No sweeper is started; the caller owns the
    /// table's expiry policy and lifecycle, so [`ManagedStorage::destroy`]
    /// leaves its contents alone.
    pub fn from_engine(name: impl Into<String>, engine: Arc<StorageEngine>) -> Self {
        Self {
            name: name.into(),
            engine,
            sweeper: None,
            strict_compare_and_set: false,
            owns_table: false,
        }
    }

    /// Returns the underlying table.
    pub fn engine(&self) -> &Arc<StorageEngine> {
        &self.engine
    }

    /// Returns the running sweeper, if any.
    pub fn sweeper(&self) -> Option<&ExpirySweeper> {
        self.sweeper.as_ref()
    }
}

fn ttl_from_seconds(ttl_seconds: i64) -> Option<Duration> {
    (ttl_seconds > 0).then(|| Duration::from_secs(ttl_seconds as u64))
}

// Rounded up so a live entry never reports "no TTL".
fn ttl_to_seconds(ttl: Option<Duration>) -> i64 {
    match ttl {
        None => NO_TTL,
        Some(ttl) => {
            let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
            secs.max(1).min(i64::MAX as u64) as i64
        }
    }
}

fn to_raw_entry(key: Bytes, entry: Entry, only_keys: bool) -> RawEntry {
    let ttl = ttl_to_seconds(entry.ttl());
    RawEntry {
        key,
        value: if only_keys { Bytes::new() } else { entry.value },
        ttl,
        version: entry.version,
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, prefix: &[u8], key: &[u8], required: bool) -> Result<Option<Bytes>> {
        let key = namespace_key(prefix, key);
        match self.engine.get(&key) {
            None if required => Err(StorageError::NotFound { key }),
            value => Ok(value),
        }
    }

    fn get_entry(&self, prefix: &[u8], key: &[u8]) -> Result<Option<RawEntry>> {
        let key = namespace_key(prefix, key);
        Ok(self
            .engine
            .get_entry(&key)
            .map(|entry| to_raw_entry(key, entry, false)))
    }

    fn set(&self, prefix: &[u8], key: &[u8], value: Bytes, ttl_seconds: i64) -> Result<()> {
        self.engine.put(
            namespace_key(prefix, key),
            value,
            ttl_from_seconds(ttl_seconds),
        );
        Ok(())
    }

    fn compare_and_set(
        &self,
        prefix: &[u8],
        key: &[u8],
        value: Bytes,
        ttl_seconds: i64,
        expected_version: u64,
    ) -> Result<bool> {
        let key = namespace_key(prefix, key);
        let ttl = ttl_from_seconds(ttl_seconds);

        if !self.strict_compare_and_set {
            self.engine.put(key, value, ttl);
            return Ok(true);
        }
        Ok(self.engine.compare_and_set(key, value, ttl, expected_version))
    }

    fn remove(&self, prefix: &[u8], key: &[u8]) -> Result<()> {
        self.engine.delete(&namespace_key(prefix, key));
        Ok(())
    }

    fn do_in_transaction(
        &self,
        prefix: &[u8],
        key: &[u8],
        mutate: &mut dyn FnMut(&mut RawEntry) -> bool,
    ) -> Result<()> {
        let key = namespace_key(prefix, key);

        let mut entry = match self.engine.get_entry(&key) {
            Some(entry) => to_raw_entry(key.clone(), entry, false),
            None => RawEntry::empty(key.clone()),
        };

        if !mutate(&mut entry) {
            debug!(key = ?key, "Transaction canceled by callback");
            return Err(StorageError::Canceled);
        }

        self.engine.put(key, entry.value, ttl_from_seconds(entry.ttl));
        Ok(())
    }

    fn enumerate(
        &self,
        prefix: &[u8],
        seek: &[u8],
        only_keys: bool,
        consumer: &mut dyn FnMut(&RawEntry) -> bool,
    ) -> Result<()> {
        self.engine.scan(prefix, seek, |key, entry| {
            consumer(&to_raw_entry(key, entry, only_keys))
        });
        Ok(())
    }

    fn fetch_keys(&self, prefix: &[u8]) -> Result<Vec<Bytes>> {
        Ok(self.engine.keys_with_prefix(prefix))
    }

    fn drop_with_prefix(&self, prefix: &[u8]) -> Result<()> {
        let removed = self.engine.delete_with_prefix(prefix);
        debug!(name = %self.name, prefix = %String::from_utf8_lossy(prefix), removed, "Dropped prefix");
        Ok(())
    }

    fn drop_all(&self) -> Result<()> {
        self.engine.flush();
        debug!(name = %self.name, "Dropped all keys");
        Ok(())
    }

    fn compact(&self, discard_ratio: f64) -> Result<()> {
        // Nothing is fragmented in memory; compaction is an immediate sweep
        let removed = self.engine.cleanup_expired();
        debug!(name = %self.name, discard_ratio, removed, "Compaction finished");
        Ok(())
    }

    fn backup(&self, sink: &mut dyn Write, since: u64) -> Result<u64> {
        if since > 0 {
            debug!(since, "Incremental backup not supported, writing a full snapshot");
        }
        self.engine.save(sink)
    }

    fn restore(&self, source: &mut dyn Read) -> Result<()> {
        self.engine.load(source).map(|_| ())
    }

    fn instance(&self) -> &dyn Any {
        &self.engine
    }
}

impl ManagedStorage for InMemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn destroy(&self) -> Result<()> {
        if let Some(sweeper) = &self.sweeper {
            sweeper.stop();
        }
        if self.owns_table {
            self.engine.flush();
        }
        info!(name = %self.name, owns_table = self.owns_table, "In-memory storage destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> InMemoryStorage {
        InMemoryStorage::open("test", StorageConfig::default().without_cleanup()).unwrap()
    }

    #[test]
    fn test_ttl_conversions() {
        assert_eq!(ttl_from_seconds(0), None);
        assert_eq!(ttl_from_seconds(-5), None);
        assert_eq!(ttl_from_seconds(3), Some(Duration::from_secs(3)));

        assert_eq!(ttl_to_seconds(None), NO_TTL);
        assert_eq!(ttl_to_seconds(Some(Duration::from_millis(1500))), 2);
        assert_eq!(ttl_to_seconds(Some(Duration::from_secs(2))), 2);
        assert_eq!(ttl_to_seconds(Some(Duration::ZERO)), 1);
    }

    #[test]
    fn test_required_get() {
        let storage = storage();
        assert_eq!(storage.get(b"p:", b"missing", false).unwrap(), None);

        let err = storage.get(b"p:", b"missing", true).unwrap_err();
        match err {
            StorageError::NotFound { key } => assert_eq!(key, Bytes::from("p:missing")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_get_entry_metadata() {
        let storage = storage();
        storage.set(b"p:", b"k", Bytes::from("v"), 60).unwrap();

        let entry = storage.get_entry(b"p:", b"k").unwrap().unwrap();
        assert_eq!(entry.key, Bytes::from("p:k"));
        assert_eq!(entry.value, Bytes::from("v"));
        assert_eq!(entry.ttl, 60);
        assert!(entry.version > 0);
    }

    #[test]
    fn test_weak_compare_and_set_always_writes() {
        let storage = storage();
        storage.set(b"p:", b"k", Bytes::from("old"), 0).unwrap();

        assert!(storage
            .compare_and_set(b"p:", b"k", Bytes::from("new"), 0, 12345)
            .unwrap());
        assert_eq!(
            storage.get(b"p:", b"k", true).unwrap(),
            Some(Bytes::from("new"))
        );
    }

    #[test]
    fn test_strict_compare_and_set() {
        let config = StorageConfig::default()
            .without_cleanup()
            .with_strict_compare_and_set(true);
        let storage = InMemoryStorage::open("strict", config).unwrap();
        storage.set(b"p:", b"k", Bytes::from("old"), 0).unwrap();
        let version = storage.get_entry(b"p:", b"k").unwrap().unwrap().version;

        assert!(!storage
            .compare_and_set(b"p:", b"k", Bytes::from("x"), 0, version + 1)
            .unwrap());
        assert!(storage
            .compare_and_set(b"p:", b"k", Bytes::from("new"), 0, version)
            .unwrap());
        assert_eq!(
            storage.get(b"p:", b"k", true).unwrap(),
            Some(Bytes::from("new"))
        );
    }

    #[test]
    fn test_transaction_placeholder_for_missing_key() {
        let storage = storage();

        let mut seen = None;
        storage
            .do_in_transaction(b"p:", b"counter", &mut |entry| {
                seen = Some(entry.clone());
                entry.value = Bytes::from("1");
                true
            })
            .unwrap();

        assert_eq!(seen, Some(RawEntry::empty(Bytes::from("p:counter"))));
        assert_eq!(
            storage.get(b"p:", b"counter", true).unwrap(),
            Some(Bytes::from("1"))
        );
    }

    #[test]
    fn test_transaction_can_set_ttl() {
        let storage = storage();
        storage
            .do_in_transaction(b"p:", b"k", &mut |entry| {
                entry.value = Bytes::from("v");
                entry.ttl = 30;
                true
            })
            .unwrap();

        let entry = storage.get_entry(b"p:", b"k").unwrap().unwrap();
        assert_eq!(entry.ttl, 30);
    }

    #[test]
    fn test_transaction_keeps_rounded_ttl() {
        let storage = storage();
        storage.set(b"p:", b"k", Bytes::from("v"), 2).unwrap();
        std::thread::sleep(Duration::from_millis(300));

        storage
            .do_in_transaction(b"p:", b"k", &mut |entry| {
                assert_eq!(entry.ttl, 2);
                entry.value = Bytes::from("w");
                true
            })
            .unwrap();

        // The deadline restarted from the rounded-up 2s, not the 1.7s left
        let remaining = storage.engine().get_entry(b"p:k").unwrap().ttl().unwrap();
        assert!(remaining > Duration::from_millis(1800));
        assert!(remaining <= Duration::from_secs(2));
        assert_eq!(storage.get(b"p:", b"k", true).unwrap(), Some(Bytes::from("w")));
    }

    #[test]
    fn test_fetch_keys_hides_unswept_expired() {
        let storage = storage();
        storage.set(b"p:", b"short", Bytes::from("1"), 1).unwrap();
        storage.set(b"p:", b"long", Bytes::from("2"), 0).unwrap();

        std::thread::sleep(Duration::from_millis(1100));

        assert_eq!(storage.fetch_keys(b"p:").unwrap(), vec![Bytes::from("p:long")]);
        assert_eq!(storage.engine().len(), 2);
    }

    #[test]
    fn test_enumerate_only_keys() {
        let storage = storage();
        storage.set(b"p:", b"a", Bytes::from("1"), 0).unwrap();

        let mut entries = Vec::new();
        storage
            .enumerate(b"p:", b"", true, &mut |entry| {
                entries.push(entry.clone());
                true
            })
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, Bytes::from("p:a"));
        assert!(entries[0].value.is_empty());
    }

    #[test]
    fn test_instance_exposes_engine() {
        let storage = storage();
        storage.set(b"", b"k", Bytes::from("v"), 0).unwrap();

        let engine = storage
            .instance()
            .downcast_ref::<Arc<StorageEngine>>()
            .unwrap();
        assert_eq!(engine.get(b"k"), Some(Bytes::from("v")));
        assert!(Arc::ptr_eq(engine, storage.engine()));
    }

    #[test]
    fn test_from_engine_shares_table() {
        let engine = Arc::new(StorageEngine::new());
        engine.set(Bytes::from("k"), Bytes::from("v"));

        let storage = InMemoryStorage::from_engine("shared", Arc::clone(&engine));
        assert!(storage.sweeper().is_none());
        assert_eq!(storage.name(), "shared");
        assert_eq!(
            storage.get(b"", b"k", true).unwrap(),
            Some(Bytes::from("v"))
        );
    }

    #[test]
    fn test_destroy_leaves_borrowed_table_intact() {
        let engine = Arc::new(StorageEngine::new());
        engine.set(Bytes::from("k"), Bytes::from("v"));

        let view = InMemoryStorage::from_engine("view", Arc::clone(&engine));
        view.destroy().unwrap();

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get(b"k"), Some(Bytes::from("v")));
    }

    #[test]
    fn test_destroy_stops_sweeper_and_clears() {
        let storage = InMemoryStorage::new_default("doomed").unwrap();
        storage.set(b"", b"k", Bytes::from("v"), 0).unwrap();

        storage.destroy().unwrap();

        assert!(storage.sweeper().unwrap().is_stopped());
        assert!(storage.engine().is_empty());
    }
}
