//! In-memory [`LedgerStore`] for tests, benches and the batch runner.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;

use stockledger_core::{ItemCode, VoucherNo};
use stockledger_inventory::{DocumentStatus, LedgerEntry, LedgerKey, StockPosting};

use super::r#trait::{CommitBatch, LedgerStore, PostingFilter, StoreError};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<LedgerKey, LedgerEntry>,
    /// Last version of removed rows, so a re-created row keeps counting.
    removed_versions: HashMap<LedgerKey, u64>,
    postings: Vec<StockPosting>,
    statuses: HashMap<VoucherNo, DocumentStatus>,
    item_rates: HashMap<ItemCode, f64>,
    last_sequence: u64,
}

/// In-memory ledger store.
///
/// Intended for tests/dev and the batch runner. One `RwLock` guards all
/// state, which makes every commit trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of current-state rows.
    pub fn entry_count(&self) -> usize {
        self.inner.read().map(|i| i.entries.len()).unwrap_or(0)
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.entries.get(key).cloned())
    }

    fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;

        // Validate the whole batch before touching anything.
        let mut seen = HashSet::with_capacity(batch.writes.len());
        for write in &batch.writes {
            if !seen.insert(&write.key) {
                return Err(StoreError::InvalidCommit(format!(
                    "batch writes {} more than once",
                    write.key
                )));
            }
            let current = inner.entries.get(&write.key).map(|e| e.version).unwrap_or(0);
            if !write.expected_version.matches(current) {
                return Err(StoreError::Concurrency(format!(
                    "{}: expected {:?}, found {current}",
                    write.key, write.expected_version
                )));
            }
        }

        if let Some(transition) = &batch.status {
            let current = inner.statuses.get(&transition.voucher_number).copied();
            if current != transition.expected {
                return Err(StoreError::Concurrency(format!(
                    "document {}: expected status {:?}, found {current:?}",
                    transition.voucher_number, transition.expected
                )));
            }
        }

        let mut written = Vec::with_capacity(batch.writes.len());
        for write in batch.writes {
            let last_version = match inner.entries.get(&write.key) {
                Some(entry) => entry.version,
                None => inner.removed_versions.get(&write.key).copied().unwrap_or(0),
            };

            let Some(state) = write.state else {
                if let Some(removed) = inner.entries.remove(&write.key) {
                    inner.removed_versions.insert(write.key, removed.version);
                }
                continue;
            };

            let entry = LedgerEntry {
                key: write.key.clone(),
                quantity: state.quantity,
                rate: state.rate,
                posting_date: write.posting_date,
                voucher_number: write.voucher_number,
                version: last_version + 1,
            };
            inner.removed_versions.remove(&write.key);
            inner.entries.insert(write.key, entry.clone());
            written.push(entry);
        }

        if let Some(transition) = batch.status {
            if transition.next == DocumentStatus::Cancelled {
                for posting in inner
                    .postings
                    .iter_mut()
                    .filter(|p| p.voucher_number == transition.voucher_number)
                {
                    posting.is_cancelled = true;
                }
            }
            inner
                .statuses
                .insert(transition.voucher_number, transition.next);
        }

        let recorded_at = Utc::now();
        for posting in batch.postings {
            inner.last_sequence += 1;
            let sequence = inner.last_sequence;
            inner
                .postings
                .push(StockPosting::from_new(posting, sequence, recorded_at));
        }

        Ok(written)
    }

    fn entries_for_item(&self, item_code: &ItemCode) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut entries: Vec<_> = inner
            .entries
            .values()
            .filter(|e| e.key.item_code == *item_code)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn postings(&self, filter: &PostingFilter) -> Result<Vec<StockPosting>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        let mut postings: Vec<_> = inner
            .postings
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        postings.sort_by_key(|p| (p.posting_date, p.sequence));
        Ok(postings)
    }

    fn document_status(
        &self,
        voucher_number: &VoucherNo,
    ) -> Result<Option<DocumentStatus>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.statuses.get(voucher_number).copied())
    }

    fn publish_item_rate(&self, item_code: &ItemCode, rate: f64) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        inner.item_rates.insert(item_code.clone(), rate);
        Ok(())
    }

    fn item_rate(&self, item_code: &ItemCode) -> Result<Option<f64>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.item_rates.get(item_code).copied())
    }
}
