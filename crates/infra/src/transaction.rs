//! Scoped unit of work over the ledger store.
//!
//! A `LedgerTransaction` holds the per-key locks of one document, caches the
//! rows it read (their versions become the commit's expectations) and
//! buffers every write until [`LedgerTransaction::commit`]. Dropping it
//! without committing is a rollback: nothing reaches the store.

use std::collections::{BTreeSet, HashMap};

use stockledger_core::{ExpectedVersion, ItemCode, VoucherNo};
use stockledger_inventory::{
    DocumentStatus, LedgerEntry, LedgerKey, LedgerState, NewPosting, StockPosting,
};

use crate::error::PostingError;
use crate::ledger_store::{CommitBatch, EntryWrite, LedgerStore, PostingFilter, StatusTransition};
use crate::locks::KeyLockGuard;

pub struct LedgerTransaction<'a, S: ?Sized> {
    store: &'a S,
    locks: KeyLockGuard<'a>,
    voucher_number: VoucherNo,
    read_versions: HashMap<LedgerKey, u64>,
    current: HashMap<LedgerKey, Option<LedgerState>>,
    write_order: Vec<LedgerKey>,
    postings: Vec<NewPosting>,
    status: Option<Option<DocumentStatus>>,
    next_status: Option<DocumentStatus>,
    revalued_items: BTreeSet<ItemCode>,
}

impl<S: ?Sized> core::fmt::Debug for LedgerTransaction<'_, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerTransaction")
            .field("voucher_number", &self.voucher_number)
            .field("keys", self.locks.keys())
            .field("staged_postings", &self.postings.len())
            .finish()
    }
}

impl<'a, S> LedgerTransaction<'a, S>
where
    S: LedgerStore + ?Sized,
{
    pub(crate) fn new(store: &'a S, locks: KeyLockGuard<'a>, voucher_number: VoucherNo) -> Self {
        Self {
            store,
            locks,
            voucher_number,
            read_versions: HashMap::new(),
            current: HashMap::new(),
            write_order: Vec::new(),
            postings: Vec::new(),
            status: None,
            next_status: None,
            revalued_items: BTreeSet::new(),
        }
    }

    pub fn voucher_number(&self) -> &VoucherNo {
        &self.voucher_number
    }

    pub fn keys(&self) -> &BTreeSet<LedgerKey> {
        self.locks.keys()
    }

    /// State of `key` as this unit of work sees it (staged writes included).
    pub fn state(&mut self, key: &LedgerKey) -> Result<Option<LedgerState>, PostingError> {
        if !self.locks.covers(key) {
            return Err(PostingError::InvariantViolation(format!(
                "{key} is not locked by the unit of work for {}",
                self.voucher_number
            )));
        }
        if let Some(state) = self.current.get(key) {
            return Ok(*state);
        }

        let entry = self.store.get(key)?;
        let state = entry.as_ref().map(LedgerEntry::state);
        self.read_versions
            .insert(key.clone(), entry.map(|e| e.version).unwrap_or(0));
        self.current.insert(key.clone(), state);
        Ok(state)
    }

    /// Status of the document, read once per unit of work.
    pub fn document_status(&mut self) -> Result<Option<DocumentStatus>, PostingError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let status = self.store.document_status(&self.voucher_number)?;
        self.status = Some(status);
        Ok(status)
    }

    /// Non-cancelled postings already recorded for this document.
    pub fn recorded_postings(&self) -> Result<Vec<StockPosting>, PostingError> {
        let mut postings = self
            .store
            .postings(&PostingFilter::voucher(self.voucher_number.clone()))?;
        postings.sort_by_key(|p| p.sequence);
        Ok(postings)
    }

    /// Buffer one posting; the row of its key moves to `posting.after`
    /// (`None` removes it at commit).
    pub fn stage(&mut self, posting: NewPosting) -> Result<(), PostingError> {
        if posting.voucher_number != self.voucher_number {
            return Err(PostingError::InvariantViolation(format!(
                "posting for {} staged in the unit of work for {}",
                posting.voucher_number, self.voucher_number
            )));
        }
        // Make sure the version expectation for the key is captured.
        self.state(&posting.key)?;

        if !self.write_order.contains(&posting.key) {
            self.write_order.push(posting.key.clone());
        }
        self.current.insert(posting.key.clone(), posting.after);
        self.postings.push(posting);
        Ok(())
    }

    pub fn set_status(&mut self, next: DocumentStatus) {
        self.next_status = Some(next);
    }

    /// Record that the item-level average must be republished after commit.
    pub fn mark_revalued(&mut self, item_code: &ItemCode) {
        self.revalued_items.insert(item_code.clone());
    }

    pub fn revalued_items(&self) -> &BTreeSet<ItemCode> {
        &self.revalued_items
    }

    pub fn has_changes(&self) -> bool {
        !self.postings.is_empty() || self.next_status.is_some()
    }

    /// Persist the unit of work atomically and release the locks.
    ///
    /// Returns the rows of every key the transaction locked, after the commit.
    pub fn commit(mut self) -> Result<Vec<LedgerEntry>, PostingError> {
        if self.has_changes() {
            let batch = self.build_batch()?;
            self.store.commit(batch)?;
        }

        let mut entries = Vec::with_capacity(self.keys().len());
        for key in self.keys() {
            if let Some(entry) = self.store.get(key)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Discard every staged change and release the locks.
    pub fn rollback(self) {
        tracing::debug!(voucher = %self.voucher_number, "unit of work rolled back");
    }

    fn build_batch(&mut self) -> Result<CommitBatch, PostingError> {
        let mut writes = Vec::with_capacity(self.write_order.len());

        for key in &self.write_order {
            let state = self.current.get(key).copied().flatten();
            let posting_date = self
                .postings
                .iter()
                .rev()
                .find(|p| p.key == *key)
                .map(|p| p.posting_date)
                .ok_or_else(|| {
                    PostingError::InvariantViolation(format!("no staged posting for {key}"))
                })?;
            let version = self.read_versions.get(key).copied().unwrap_or(0);

            writes.push(EntryWrite {
                key: key.clone(),
                state,
                posting_date,
                voucher_number: self.voucher_number.clone(),
                expected_version: ExpectedVersion::Exact(version),
            });
        }

        let status = match self.next_status {
            Some(next) => Some(StatusTransition {
                voucher_number: self.voucher_number.clone(),
                expected: self.document_status()?,
                next,
            }),
            None => None,
        };

        Ok(CommitBatch {
            writes,
            postings: std::mem::take(&mut self.postings),
            status,
        })
    }
}
