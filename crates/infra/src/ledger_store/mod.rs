//! Ledger Entry Store boundary.
//!
//! Current-state rows keyed by (item, warehouse), plus the append-only
//! movement log that balance reports replay. No storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use r#trait::{
    CommitBatch, EntryWrite, LedgerStore, PostingFilter, StatusTransition, StoreError,
};
