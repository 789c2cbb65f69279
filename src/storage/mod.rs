//! Storage Layer
//!
//! Two-tier persistence for documents:
//! - [`cold`]: point-in-time snapshots (`ColdStore`), grounded on the
//!   teacher's `graph_manager.rs` JSON save routine and
//!   `graph_registry.rs`'s atomic-write pattern.
//! - [`hot`]: the append-only write-ahead log since the last snapshot
//!   (`HotStore`), grounded on the teacher's `storage/transaction_log.rs`
//!   sled-backed log, re-keyed per document version instead of per
//!   graph operation.
//!
//! A document's durable state is always `cold snapshot + hot WAL since
//! that snapshot's version`; see `instance.rs` for the restore and
//! snapshot lifecycle built on top of these two traits.

pub mod cold;
pub mod hot;

pub use cold::{ColdStore, JsonFileColdStore, SledColdStore, StoredDoc};
pub use hot::{HotStore, SledHotStore, WalEntry};
