//! Stock ledger data model: keys, current-state rows and movement-log postings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ItemCode, PostingId, ValueObject, VoucherNo, WarehouseId};

use crate::valuation::{FlowDirection, LedgerState};

/// (item, warehouse) pair identifying one balance/rate state machine.
///
/// Ordered by item, then warehouse; lock acquisition and reports rely on the
/// ordering being total.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    pub item_code: ItemCode,
    pub warehouse: WarehouseId,
}

impl ValueObject for LedgerKey {}

impl LedgerKey {
    pub fn new(item_code: ItemCode, warehouse: WarehouseId) -> Self {
        Self {
            item_code,
            warehouse,
        }
    }
}

impl core::fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.item_code, self.warehouse)
    }
}

/// Current cumulative state of one key (at most one row per [`LedgerKey`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub key: LedgerKey,
    /// Running balance after the latest posting (cumulative, not a delta).
    pub quantity: f64,
    /// Moving-average rate after the latest posting.
    pub rate: f64,
    pub posting_date: NaiveDate,
    pub voucher_number: VoucherNo,
    /// Write counter used as the optimistic concurrency token. `0` is never
    /// stored; it stands for "row absent".
    pub version: u64,
}

impl LedgerEntry {
    pub fn state(&self) -> LedgerState {
        LedgerState::new(self.quantity, self.rate)
    }

    pub fn value(&self) -> f64 {
        self.state().value()
    }
}

/// What a posting did to its key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Inbound,
    Outbound,
    /// Reconciliation delta applied without a paired source/destination.
    Adjustment,
}

impl MovementKind {
    pub fn direction(self) -> Option<FlowDirection> {
        match self {
            MovementKind::Inbound => Some(FlowDirection::Inbound),
            MovementKind::Outbound => Some(FlowDirection::Outbound),
            MovementKind::Adjustment => None,
        }
    }
}

impl From<FlowDirection> for MovementKind {
    fn from(value: FlowDirection) -> Self {
        match value {
            FlowDirection::Inbound => MovementKind::Inbound,
            FlowDirection::Outbound => MovementKind::Outbound,
        }
    }
}

/// A posting that is ready to be appended to the movement log (no sequence yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPosting {
    pub posting_id: PostingId,
    pub key: LedgerKey,
    pub posting_date: NaiveDate,
    pub voucher_number: VoucherNo,
    pub kind: MovementKind,
    /// Signed quantity delta of this posting.
    pub quantity: f64,
    /// Incoming price for inbound flows, carried rate otherwise.
    pub rate: f64,
    /// Row state before this posting (`None` when the key had no row).
    pub before: Option<LedgerState>,
    /// Row state after this posting (`None` when the posting removed the row).
    pub after: Option<LedgerState>,
    pub is_reversal: bool,
}

/// A posting stored in the append-only movement log.
///
/// `sequence` is assigned by the store on append and orders postings that
/// share a posting date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockPosting {
    pub posting_id: PostingId,
    pub sequence: u64,
    pub key: LedgerKey,
    pub posting_date: NaiveDate,
    pub voucher_number: VoucherNo,
    pub kind: MovementKind,
    pub quantity: f64,
    pub rate: f64,
    pub before: Option<LedgerState>,
    pub after: Option<LedgerState>,
    pub is_reversal: bool,
    /// Set on every posting of a cancelled voucher, reversals included.
    pub is_cancelled: bool,
    pub recorded_at: DateTime<Utc>,
}

impl StockPosting {
    pub fn from_new(posting: NewPosting, sequence: u64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            posting_id: posting.posting_id,
            sequence,
            key: posting.key,
            posting_date: posting.posting_date,
            voucher_number: posting.voucher_number,
            kind: posting.kind,
            quantity: posting.quantity,
            rate: posting.rate,
            before: posting.before,
            after: posting.after,
            is_reversal: posting.is_reversal,
            is_cancelled: posting.is_reversal,
            recorded_at,
        }
    }

    /// Value moved by this posting (`quantity * rate`, signed).
    pub fn value(&self) -> f64 {
        self.quantity * self.rate
    }
}

/// Lifecycle state of a movement document as recorded by the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Submitted,
    Cancelled,
}
