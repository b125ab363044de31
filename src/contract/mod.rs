//! Storage Contract
//!
//! The uniform interface every storage backend implements, so callers can
//! swap a volatile in-memory table for a durable engine without code changes.
//!
//! Keys are always addressed as `(prefix, key)` pairs and concatenated into a
//! single namespace key (see [`crate::storage::namespace`]). TTLs are whole
//! seconds, with `<= 0` meaning "never expires".
//!
//! The trait is object safe; callbacks and streams are taken as trait
//! objects so backends can be used as `Box<dyn ManagedStorage>`.

mod entry;

pub use entry::{RawEntry, NO_TTL};

use crate::error::Result;
use bytes::Bytes;
use std::any::Any;
use std::io::{Read, Write};

/// Operations shared by all storage backends.
pub trait Storage: Send + Sync {
    /// Returns the live value for `prefix ++ key`.
    ///
    /// A missing or expired key yields `Ok(None)`, or
    /// [`StorageError::NotFound`](crate::StorageError::NotFound) when
    /// `required` is set.
    fn get(&self, prefix: &[u8], key: &[u8], required: bool) -> Result<Option<Bytes>>;

    /// Returns the live entry for `prefix ++ key` with its TTL and version.
    fn get_entry(&self, prefix: &[u8], key: &[u8]) -> Result<Option<RawEntry>>;

    /// Inserts or overwrites an entry.
    fn set(&self, prefix: &[u8], key: &[u8], value: Bytes, ttl_seconds: i64) -> Result<()>;

    /// Writes an entry if its stored version matches `expected_version`.
    ///
    /// Returns whether the write happened. Backends that do not track
    /// versions may write unconditionally and return `true`.
    fn compare_and_set(
        &self,
        prefix: &[u8],
        key: &[u8],
        value: Bytes,
        ttl_seconds: i64,
        expected_version: u64,
    ) -> Result<bool>;

    /// Deletes an entry; deleting a missing key is not an error.
    fn remove(&self, prefix: &[u8], key: &[u8]) -> Result<()>;

    /// Runs a read-modify-write on one key.
    ///
    /// `mutate` receives the current entry (or an empty placeholder) and may
    /// change its value and TTL. Returning `false` discards the changes and
    /// fails with [`StorageError::Canceled`](crate::StorageError::Canceled).
    ///
    /// The loaded `ttl` is the remaining lifetime rounded up to whole
    /// seconds. Committing without touching it restarts the expiry from that
    /// rounded value, so each commit can extend the entry by up to a second
    /// and a key updated more often than once a second may never expire.
    fn do_in_transaction(
        &self,
        prefix: &[u8],
        key: &[u8],
        mutate: &mut dyn FnMut(&mut RawEntry) -> bool,
    ) -> Result<()>;

    /// Walks entries whose namespace key starts with `prefix` and is `>= seek`.
    ///
    /// The order is backend-defined. `consumer` returns `false` to stop.
    /// With `only_keys` the entries carry empty values.
    fn enumerate(
        &self,
        prefix: &[u8],
        seek: &[u8],
        only_keys: bool,
        consumer: &mut dyn FnMut(&RawEntry) -> bool,
    ) -> Result<()>;

    /// Collects every key starting with `prefix`.
    fn fetch_keys(&self, prefix: &[u8]) -> Result<Vec<Bytes>>;

    /// Deletes every key starting with `prefix`.
    fn drop_with_prefix(&self, prefix: &[u8]) -> Result<()>;

    /// Deletes every key.
    fn drop_all(&self) -> Result<()>;

    /// Reclaims space; `discard_ratio` is a backend-specific hint.
    fn compact(&self, discard_ratio: f64) -> Result<()>;

    /// Writes a snapshot to `sink` and returns the number of bytes written.
    ///
    /// `since` selects an incremental backup on backends that support one.
    fn backup(&self, sink: &mut dyn Write, since: u64) -> Result<u64>;

    /// Loads a snapshot produced by [`Storage::backup`].
    fn restore(&self, source: &mut dyn Read) -> Result<()>;

    /// Returns the backend's native handle for non-portable use.
    fn instance(&self) -> &dyn Any;
}

/// A named storage instance with an explicit teardown.
pub trait ManagedStorage: Storage {
    /// Returns the instance name.
    fn name(&self) -> &str;

    /// Releases the instance's resources.
    fn destroy(&self) -> Result<()>;
}
