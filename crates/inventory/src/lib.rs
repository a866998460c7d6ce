//! Inventory domain module: stock ledger data model and valuation.
//!
//! This crate contains business rules for stock movements, implemented purely
//! as deterministic domain logic (no IO, no locking, no storage).

pub mod document;
pub mod ledger;
pub mod valuation;

pub use document::{
    DocumentTotals, DocumentType, MovementDocument, MovementLine, PlannedLeg, TransferPosting,
    touched_keys,
};
pub use ledger::{DocumentStatus, LedgerEntry, LedgerKey, MovementKind, NewPosting, StockPosting};
pub use valuation::{FlowDirection, LedgerState, adjust, apply_flow, moving_average, reverse_flow};
