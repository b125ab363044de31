//! # memstore - A Volatile In-Memory Storage Engine
//!
//! memstore is a process-local key/value store exposed through the same
//! storage contract as durable backends, so callers can swap persistence
//! strategies without code changes. Nothing survives a restart unless it is
//! explicitly backed up.
//!
//! ## Features
//!
//! - **Uniform Contract**: [`Storage`] / [`ManagedStorage`] traits, object safe
//! - **Namespaces**: every key is addressed as a `(prefix, key)` pair
//! - **TTL Support**: entries can expire, with lazy and active expiry
//! - **Enumeration**: prefix + seek walks with early termination
//! - **Transactions**: single-key read-modify-write with callback-driven cancel
//! - **Snapshots**: checksummed binary backup and restore
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           InMemoryStorage                               │
//! │                  (Storage / ManagedStorage contract)                    │
//! │                                   │                                     │
//! │                     namespace_key(prefix, key)                          │
//! │                                   ▼                                     │
//! │                     ┌──────────────────────────────────────────────┐    │
//! │                     │              StorageEngine                   │    │
//! │                     │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │    │
//! │                     │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │    │
//! │                     │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │    │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │    │
//! │                     └──────────────────────────────────────────────┘    │
//! │                          ▲                           │                  │
//! │     ┌────────────────────┴──────────┐     ┌──────────┴──────────┐       │
//! │     │        ExpirySweeper          │     │  Snapshot codec     │       │
//! │     │  (per-instance background)    │     │  (backup/restore)   │       │
//! │     └───────────────────────────────┘     └─────────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use memstore::{InMemoryStorage, StorageConfig, Storage};
//! use bytes::Bytes;
//!
//! let storage = InMemoryStorage::open("sessions", StorageConfig::default()).unwrap();
//!
//! storage.set(b"user:", b"1", Bytes::from("Alice"), 0).unwrap();
//! storage.set(b"user:", b"2", Bytes::from("Bob"), 60).unwrap();
//!
//! let mut names = Vec::new();
//! storage
//!     .enumerate(b"user:", b"", false, &mut |entry| {
//!         names.push(entry.value.clone());
//!         true
//!     })
//!     .unwrap();
//! assert_eq!(names.len(), 2);
//!
//! let mut snapshot = Vec::new();
//! storage.backup(&mut snapshot, 0).unwrap();
//! ```
//!
//! ## Module Overview
//!
//! - [`contract`]: the storage traits shared with other backends
//! - [`inmemory`]: the in-memory implementation and its configuration
//! - [`storage`]: the concrete expiring table, sweeper and snapshot codec
//! - [`error`]: error types
//!
//! ## Design Highlights
//!
//! ### Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is read or enumerated, expired entries are treated as absent
//! 2. **Active**: A background sweeper periodically removes expired entries
//!
//! ### Known weak spots
//!
//! `compare_and_set` does not check versions unless strict mode is enabled,
//! and `do_in_transaction` is not atomic across its callback. Both are
//! documented on [`InMemoryStorage`].

pub mod contract;
pub mod error;
pub mod inmemory;
pub mod storage;

// Re-export commonly used types for convenience
pub use contract::{ManagedStorage, RawEntry, Storage, NO_TTL};
pub use error::{Result, StorageError};
pub use inmemory::{InMemoryStorage, StorageConfig};
pub use storage::{ExpirySweeper, StorageEngine};

/// Version of memstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
