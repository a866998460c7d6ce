//! Store contract: row writes, movement-log appends and document status,
//! committed together.

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;

use stockledger_core::{ExpectedVersion, ItemCode, VoucherNo, WarehouseId};
use stockledger_inventory::{
    DocumentStatus, LedgerEntry, LedgerKey, LedgerState, NewPosting, StockPosting,
};

/// New state for one ledger row, guarded by an optimistic version check.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryWrite {
    pub key: LedgerKey,
    /// `None` removes the row.
    pub state: Option<LedgerState>,
    pub posting_date: NaiveDate,
    pub voucher_number: VoucherNo,
    pub expected_version: ExpectedVersion,
}

/// Document lifecycle change applied together with a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub voucher_number: VoucherNo,
    /// Status the document must currently have (`None` = never posted).
    pub expected: Option<DocumentStatus>,
    pub next: DocumentStatus,
}

/// Everything one unit of work persists, applied all-or-nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub writes: Vec<EntryWrite>,
    pub postings: Vec<NewPosting>,
    pub status: Option<StatusTransition>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.postings.is_empty() && self.status.is_none()
    }
}

/// Range-scan filter over the movement log.
///
/// All bounds are inclusive; `None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostingFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub item_code: Option<ItemCode>,
    pub warehouse: Option<WarehouseId>,
    pub voucher_number: Option<VoucherNo>,
    pub include_cancelled: bool,
}

impl PostingFilter {
    pub fn voucher(voucher_number: VoucherNo) -> Self {
        Self {
            voucher_number: Some(voucher_number),
            ..Self::default()
        }
    }

    pub fn matches(&self, posting: &StockPosting) -> bool {
        if !self.include_cancelled && posting.is_cancelled {
            return false;
        }
        if self.from_date.is_some_and(|d| posting.posting_date < d) {
            return false;
        }
        if self.to_date.is_some_and(|d| posting.posting_date > d) {
            return false;
        }
        if self
            .item_code
            .as_ref()
            .is_some_and(|i| *i != posting.key.item_code)
        {
            return false;
        }
        if self
            .warehouse
            .as_ref()
            .is_some_and(|w| *w != posting.key.warehouse)
        {
            return false;
        }
        if self
            .voucher_number
            .as_ref()
            .is_some_and(|v| *v != posting.voucher_number)
        {
            return false;
        }
        true
    }
}

/// Ledger store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, negative stock).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid commit: {0}")]
    InvalidCommit(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence boundary of the stock ledger.
///
/// Holds three things:
/// - the current-state rows, at most one per [`LedgerKey`]
/// - the append-only movement log that reports replay
/// - per-voucher document status and the published item-level rates
///
/// ## Implementation Requirements
///
/// Implementations must:
/// - apply a [`CommitBatch`] atomically (all writes, postings and the status
///   change, or none of them)
/// - reject a batch whose `expected_version`s or expected status do not match
///   with [`StoreError::Concurrency`]
/// - assign posting sequence numbers monotonically (no gaps, no duplicates)
/// - when a voucher transitions to `Cancelled`, flag all of its postings as
///   cancelled
/// - return scanned postings ordered by `(posting_date, sequence)`
pub trait LedgerStore: Send + Sync {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError>;

    /// Atomically persist one unit of work. Returns the written rows in
    /// batch order; removed rows are left out.
    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>, StoreError>;

    /// All rows of one item, across warehouses.
    fn entries_for_item(&self, item_code: &ItemCode) -> Result<Vec<LedgerEntry>, StoreError>;

    fn postings(&self, filter: &PostingFilter) -> Result<Vec<StockPosting>, StoreError>;

    fn document_status(
        &self,
        voucher_number: &VoucherNo,
    ) -> Result<Option<DocumentStatus>, StoreError>;

    /// Publish the item-level reference valuation rate.
    fn publish_item_rate(&self, item_code: &ItemCode, rate: f64) -> Result<(), StoreError>;

    fn item_rate(&self, item_code: &ItemCode) -> Result<Option<f64>, StoreError>;

    /// Blind read-modify-write of a single row (no version check, no posting).
    fn upsert(
        &self,
        key: LedgerKey,
        quantity: f64,
        rate: f64,
        posting_date: NaiveDate,
        voucher_number: VoucherNo,
    ) -> Result<LedgerEntry, StoreError> {
        let batch = CommitBatch {
            writes: vec![EntryWrite {
                key,
                state: Some(LedgerState::new(quantity, rate)),
                posting_date,
                voucher_number,
                expected_version: ExpectedVersion::Any,
            }],
            ..CommitBatch::default()
        };
        self.commit(batch)?
            .pop()
            .ok_or_else(|| StoreError::InvalidCommit("upsert wrote no row".to_string()))
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).get(key)
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).commit(batch)
    }

    fn entries_for_item(&self, item_code: &ItemCode) -> Result<Vec<LedgerEntry>, StoreError> {
        (**self).entries_for_item(item_code)
    }

    fn postings(&self, filter: &PostingFilter) -> Result<Vec<StockPosting>, StoreError> {
        (**self).postings(filter)
    }

    fn document_status(
        &self,
        voucher_number: &VoucherNo,
    ) -> Result<Option<DocumentStatus>, StoreError> {
        (**self).document_status(voucher_number)
    }

    fn publish_item_rate(&self, item_code: &ItemCode, rate: f64) -> Result<(), StoreError> {
        (**self).publish_item_rate(item_code, rate)
    }

    fn item_rate(&self, item_code: &ItemCode) -> Result<Option<f64>, StoreError> {
        (**self).item_rate(item_code)
    }
}
