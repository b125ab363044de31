//! Storage Engine Module
//!
//! This module provides the concrete table behind [`crate::InMemoryStorage`]:
//! a thread-safe, sharded key-value store with TTL support, a background
//! expiry sweeper and a binary snapshot codec.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │...64    │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ shards  │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use memstore::storage::{namespace_key, StorageEngine};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! engine.set(namespace_key(b"user:", b"1"), Bytes::from("Alice"));
//!
//! assert_eq!(engine.get(b"user:1"), Some(Bytes::from("Alice")));
//! assert_eq!(engine.keys_with_prefix(b"user:").len(), 1);
//! ```

pub mod engine;
pub mod expiry;
pub mod namespace;
pub mod snapshot;

// Re-export commonly used types
pub use engine::{Entry, StorageEngine, StorageStats};
pub use expiry::{ExpirySweeper, DEFAULT_CLEANUP_INTERVAL};
pub use namespace::namespace_key;
pub use snapshot::{SnapshotRecord, SnapshotWriter};
