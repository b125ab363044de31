//! Thread-Safe Expiring Table
//!
//! This module implements the concrete table behind every in-memory storage
//! instance: a sharded, concurrent HashMap from byte-string keys to
//! byte-string values, each with an optional expiry deadline and a version.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **Lazy Expiry**: Keys are checked for expiry on access (lazy) plus background cleanup.
//! 3. **RwLock**: Allows multiple concurrent readers with exclusive writers.
//! 4. **Table-wide Versions**: Every write is stamped from one monotonic counter,
//!    so a deleted and recreated key never reuses an old version.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-key operations lock exactly one shard. Bulk walks visit one shard
//! at a time, so they are not atomic as a whole. Snapshots are the exception:
//! [`StorageEngine::save`] and [`StorageEngine::load`] lock every shard (always
//! in index order) for their whole duration.

use crate::error::{Result, StorageError};
use crate::storage::namespace;
use crate::storage::snapshot::{self, Clock, SnapshotWriter};
use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
const NUM_SHARDS: usize = 64;

type Table = HashMap<Bytes, Entry>;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Version stamped by the write that produced this entry
    pub version: u64,
}

impl Entry {
    /// Creates a new entry that expires `ttl` from now.
    ///
    /// A TTL too large to represent as an `Instant` never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>, version: u64) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            version,
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Checks if this entry has expired as of `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Returns the remaining time to live, or None if no expiry.
    pub fn ttl(&self) -> Option<Duration> {
        self.expires_at
            .map(|exp| exp.saturating_duration_since(Instant::now()))
    }
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug)]
struct Shard {
    data: RwLock<Table>,
}

impl Shard {
    fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave a single HashMap operation
    // half-applied, so a poisoned shard is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The expiring key/value table.
///
/// This struct is designed to be wrapped in an `Arc` and shared between
/// callers and the background expiry sweeper. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use memstore::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert!(engine.exists(b"session"));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,

    /// Expiry applied by [`StorageEngine::set`]
    default_ttl: Option<Duration>,

    /// Last version handed out
    last_version: AtomicU64,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys cleaned up
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("default_ttl", &self.default_ttl)
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine whose entries never expire by default.
    pub fn new() -> Self {
        Self::with_default_ttl(None)
    }

    /// Creates a new storage engine applying `default_ttl` to [`StorageEngine::set`].
    pub fn with_default_ttl(default_ttl: Option<Duration>) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::new()).collect();

        Self {
            shards,
            default_ttl,
            last_version: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Returns the expiry applied by [`StorageEngine::set`].
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    #[inline]
    fn next_version(&self) -> u64 {
        self.last_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Inserts or overwrites a key with an explicit expiry (None = never).
    ///
    /// Returns the version stamped on the new entry.
    pub fn put(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> u64 {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(&key).write();
        let version = self.next_version();
        data.insert(key, Entry::new(value, ttl, version));

        version
    }

    /// Sets a key-value pair using the engine's default expiry.
    pub fn set(&self, key: Bytes, value: Bytes) -> u64 {
        self.put(key, value, self.default_ttl)
    }

    /// Sets a key-value pair with a TTL (Time-To-Live).
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> u64 {
        self.put(key, value, Some(ttl))
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry" - expired keys are detected and removed on access.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key (including metadata).
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // First, try a read lock (fast path for existing, non-expired keys)
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.write();
        if let Some(entry) = data.get(key) {
            if entry.is_expired() {
                data.remove(key);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            // Race: another thread may have updated the key
            return Some(entry.clone());
        }

        None
    }

    /// Deletes a key from the table.
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(key).write();
        data.remove(key).is_some()
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        let data = self.get_shard(key).read();
        data.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Writes `value` only if the key's live version equals `expected_version`.
    ///
    /// An `expected_version` of 0 means the key must be absent (or expired).
    /// The check and the write happen under the same shard lock.
    pub fn compare_and_set(
        &self,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
        expected_version: u64,
    ) -> bool {
        let mut data = self.get_shard(&key).write();

        let current = data
            .get(&key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.version)
            .unwrap_or(0);
        if current != expected_version {
            return false;
        }

        self.set_count.fetch_add(1, Ordering::Relaxed);
        let version = self.next_version();
        data.insert(key, Entry::new(value, ttl, version));
        true
    }

    /// Walks live entries whose key starts with `prefix` and is `>= seek`.
    ///
    /// Entries are visited shard by shard in no particular order. Each shard
    /// is copied under its read lock and `visit` runs with no lock held, so
    /// it may call back into the engine. Returning `false` stops the walk.
    pub fn scan<F>(&self, prefix: &[u8], seek: &[u8], mut visit: F)
    where
        F: FnMut(Bytes, Entry) -> bool,
    {
        for shard in &self.shards {
            let mut batch = Vec::new();
            {
                let data = shard.read();
                let now = Instant::now();
                for (key, entry) in data.iter() {
                    if namespace::matches(key, prefix, seek) && !entry.is_expired_at(now) {
                        batch.push((key.clone(), entry.clone()));
                    }
                }
            }

            for (key, entry) in batch {
                if !visit(key, entry) {
                    return;
                }
            }
        }
    }

    /// Returns all live keys starting with `prefix`, sorted byte-wise.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Bytes> {
        let mut result = Vec::new();

        for shard in &self.shards {
            let data = shard.read();
            let now = Instant::now();
            for (key, entry) in data.iter() {
                if key.starts_with(prefix) && !entry.is_expired_at(now) {
                    result.push(key.clone());
                }
            }
        }

        result.sort_unstable();
        result
    }

    /// Deletes every key starting with `prefix`.
    ///
    /// Shards are cleared one at a time, so concurrent readers may observe a
    /// partially dropped prefix. Returns the number of entries removed.
    pub fn delete_with_prefix(&self, prefix: &[u8]) -> u64 {
        let mut removed = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            data.retain(|key, _| !key.starts_with(prefix));
            removed += (before - data.len()) as u64;
        }

        self.del_count.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Clears all data from the table.
    pub fn flush(&self) {
        for shard in &self.shards {
            shard.write().clear();
        }
    }

    /// Returns the number of physically stored entries, expired ones included.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.read().len() as u64).sum()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }

    /// Returns table statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes expired keys from all shards.
    ///
    /// This is called by the background expiry sweeper and by compaction.
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();
            let now = Instant::now();

            data.retain(|_, entry| !entry.is_expired_at(now));

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.expired_count.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }

    /// Serializes every live entry to `sink`.
    ///
    /// All shards stay read-locked until the last byte is written, so the
    /// snapshot is consistent but writers block meanwhile.
    /// Returns the number of bytes written.
    pub fn save<W: Write + ?Sized>(&self, sink: &mut W) -> Result<u64> {
        let shards: Vec<_> = self.shards.iter().map(Shard::read).collect();
        let clock = Clock::now();

        let count = shards
            .iter()
            .flat_map(|data| data.values())
            .filter(|entry| !entry.is_expired_at(clock.instant))
            .count() as u64;

        let mut writer = SnapshotWriter::begin(sink, count)?;
        for data in &shards {
            for (key, entry) in data.iter() {
                if entry.is_expired_at(clock.instant) {
                    continue;
                }
                writer.write_record(
                    key,
                    &entry.value,
                    clock.to_epoch_ms(entry.expires_at),
                    entry.version,
                )?;
            }
        }
        let written = writer.finish()?;

        debug!(entries = count, bytes = written, "Snapshot written");
        Ok(written)
    }

    /// Merges a snapshot produced by [`StorageEngine::save`] into the table.
    ///
    /// The stream is fully decoded and verified before any shard is touched,
    /// so a corrupt snapshot leaves the table unchanged. Keys that are live in
    /// the table keep their current entry; entries that expired since the
    /// snapshot was taken are skipped. Returns the number of entries restored.
    pub fn load<R: Read + ?Sized>(&self, source: &mut R) -> Result<u64> {
        let records = match snapshot::read_snapshot(source) {
            Ok(records) => records,
            Err(err) => {
                if let StorageError::Decode(reason) = &err {
                    warn!(reason = %reason, "Rejected corrupt snapshot");
                }
                return Err(err);
            }
        };
        let total = records.len();

        let mut shards: Vec<_> = self.shards.iter().map(Shard::write).collect();
        let clock = Clock::now();
        let mut restored = 0u64;
        let mut max_version = 0u64;

        for record in records {
            let Some(expires_at) = clock.to_deadline(record.expires_at_ms) else {
                continue;
            };

            let data = &mut shards[self.shard_index(&record.key)];
            let live = data
                .get(&record.key)
                .map(|entry| !entry.is_expired_at(clock.instant))
                .unwrap_or(false);
            if live {
                continue;
            }

            max_version = max_version.max(record.version);
            data.insert(
                record.key,
                Entry {
                    value: record.value,
                    expires_at,
                    version: record.version,
                },
            );
            restored += 1;
        }

        // Keep versions monotonic across restores
        self.last_version.fetch_max(max_version, Ordering::Relaxed);
        drop(shards);

        debug!(restored, skipped = total as u64 - restored, "Snapshot restored");
        Ok(restored)
    }
}

/// Table statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of physically stored entries
    pub keys: u64,
    /// Total lookups
    pub get_ops: u64,
    /// Total writes
    pub set_ops: u64,
    /// Total deletions
    pub del_ops: u64,
    /// Total keys removed because they expired
    pub expired: u64,
}
