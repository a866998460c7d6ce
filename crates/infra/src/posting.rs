//! Posting Coordinator: turns movement documents into ledger mutations.
//!
//! ## Unit of work
//!
//! ```text
//! MovementDocument
//!   ↓
//! 1. Validate + plan legs (no locks, no reads)
//!   ↓
//! 2. Lock every (item, warehouse) key of the document
//!   ↓
//! 3. Check document status (idempotent submit/cancel)
//!   ↓
//! 4. Per leg: read key state → valuation engine → stage row + posting
//!   ↓
//! 5. Commit atomically (row versions + document status checked)
//!   ↓
//! 6. Republish item-level moving averages for revalued items
//! ```
//!
//! Any failure before step 5 drops the transaction, so nothing is written.

use std::collections::{BTreeSet, HashMap};

use stockledger_core::{DomainError, ItemCode, PostingId};
use stockledger_inventory::{
    DocumentStatus, DocumentType, FlowDirection, LedgerEntry, MovementDocument, MovementKind,
    NewPosting, PlannedLeg, StockPosting, adjust, apply_flow, moving_average, reverse_flow,
    touched_keys,
};

use crate::balance::{BalanceFilter, BalanceQueryService, BalanceRow, KeyBalance};
use crate::config::LedgerConfig;
use crate::error::PostingError;
use crate::ledger_store::LedgerStore;
use crate::locks::KeyLockTable;
use crate::transaction::LedgerTransaction;

/// Coordinates document submission and cancellation over a ledger store.
///
/// Generic over the store so tests run against `InMemoryLedgerStore` and
/// other backends plug in behind [`LedgerStore`].
#[derive(Debug)]
pub struct PostingCoordinator<S> {
    store: S,
    locks: KeyLockTable,
    config: LedgerConfig,
}

impl<S> PostingCoordinator<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            locks: KeyLockTable::new(),
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn locks(&self) -> &KeyLockTable {
        &self.locks
    }
}

impl<S> PostingCoordinator<S>
where
    S: LedgerStore,
{
    /// Open a unit of work for `document`, locking every key it touches.
    ///
    /// Validation runs first, so a malformed document never takes a lock.
    pub fn begin(
        &self,
        document: &MovementDocument,
    ) -> Result<LedgerTransaction<'_, S>, PostingError> {
        let legs = document.plan_legs(self.config.transfer_posting)?;
        let guard = self.locks.acquire(touched_keys(&legs))?;
        Ok(LedgerTransaction::new(
            &self.store,
            guard,
            document.voucher_number.clone(),
        ))
    }

    /// Stage the postings of `document` in `tx`.
    ///
    /// Submitting an already-submitted document stages nothing.
    pub fn submit_in(
        &self,
        tx: &mut LedgerTransaction<'_, S>,
        document: &MovementDocument,
    ) -> Result<(), PostingError> {
        let legs = self.plan_for(tx, document)?;

        match tx.document_status()? {
            Some(DocumentStatus::Submitted) => {
                tracing::debug!(voucher = %document.voucher_number, "document already submitted");
                return Ok(());
            }
            Some(DocumentStatus::Cancelled) => {
                return Err(PostingError::validation(format!(
                    "document {} was cancelled and cannot be submitted again",
                    document.voucher_number
                )));
            }
            None => {}
        }

        // Rate each transfer line's stock left its source with.
        let mut carried: HashMap<usize, f64> = HashMap::new();

        for leg in &legs {
            let before = tx.state(&leg.key)?;
            let (after, quantity, rate) = match leg.kind {
                MovementKind::Inbound => {
                    let rate = if leg.carries_source_rate {
                        carried.get(&leg.line_index).copied().unwrap_or(leg.price)
                    } else {
                        leg.price
                    };
                    if document.document_type != DocumentType::Reconciliation {
                        tx.mark_revalued(&leg.key.item_code);
                    }
                    let after = apply_flow(before, leg.quantity, rate, FlowDirection::Inbound);
                    (after, leg.quantity, rate)
                }
                MovementKind::Outbound => {
                    let after =
                        apply_flow(before, leg.quantity, leg.price, FlowDirection::Outbound);
                    carried.insert(leg.line_index, after.rate);
                    (after, -leg.quantity, after.rate)
                }
                MovementKind::Adjustment => {
                    let after = adjust(before, leg.quantity, leg.price);
                    if before.is_some() && after.quantity < 0.0 {
                        return Err(negative_stock(leg, after.quantity));
                    }
                    (after, leg.quantity, after.rate)
                }
            };

            tracing::debug!(
                voucher = %document.voucher_number,
                key = %leg.key,
                quantity,
                rate,
                balance = after.quantity,
                "leg staged"
            );
            tx.stage(NewPosting {
                posting_id: PostingId::new(),
                key: leg.key.clone(),
                posting_date: document.posting_date,
                voucher_number: document.voucher_number.clone(),
                kind: leg.kind,
                quantity,
                rate,
                before,
                after: Some(after),
                is_reversal: false,
            })?;
        }

        tx.set_status(DocumentStatus::Submitted);
        Ok(())
    }

    /// Stage the reversal of a submitted `document` in `tx`.
    ///
    /// Reversals are matched one-to-one against the postings the submission
    /// recorded and land on the same warehouses, in reverse order. Cancelling
    /// an already-cancelled document stages nothing.
    pub fn cancel_in(
        &self,
        tx: &mut LedgerTransaction<'_, S>,
        document: &MovementDocument,
    ) -> Result<(), PostingError> {
        let legs = self.plan_for(tx, document)?;

        match tx.document_status()? {
            Some(DocumentStatus::Submitted) => {}
            Some(DocumentStatus::Cancelled) => {
                tracing::debug!(voucher = %document.voucher_number, "document already cancelled");
                return Ok(());
            }
            None => {
                return Err(PostingError::validation(format!(
                    "document {} has not been submitted",
                    document.voucher_number
                )));
            }
        }

        let recorded = tx.recorded_postings()?;
        if !postings_match(&legs, &recorded) {
            return Err(PostingError::validation(format!(
                "document {} no longer matches the postings recorded at submission",
                document.voucher_number
            )));
        }

        for (leg, original) in legs.iter().zip(recorded.iter()).rev() {
            let current = tx.state(&leg.key)?;
            let after = if current == original.after {
                // Nothing touched the key since: restore it verbatim.
                original.before
            } else {
                Some(match leg.kind.direction() {
                    Some(direction) => reverse_flow(
                        current,
                        original.quantity.abs(),
                        original.rate,
                        direction,
                    ),
                    None => {
                        let state = current.ok_or_else(|| {
                            PostingError::InvariantViolation(format!(
                                "no ledger entry for {} to reverse",
                                leg.key
                            ))
                        })?;
                        let after = adjust(Some(state), -original.quantity, state.rate);
                        if after.quantity < 0.0 {
                            return Err(negative_stock(leg, after.quantity));
                        }
                        after
                    }
                })
            };

            if leg.kind == MovementKind::Inbound
                && document.document_type != DocumentType::Reconciliation
            {
                tx.mark_revalued(&leg.key.item_code);
            }

            tx.stage(NewPosting {
                posting_id: PostingId::new(),
                key: leg.key.clone(),
                posting_date: document.posting_date,
                voucher_number: document.voucher_number.clone(),
                kind: inverse_kind(leg.kind),
                quantity: -original.quantity,
                rate: original.rate,
                before: current,
                after,
                is_reversal: true,
            })?;
        }

        tx.set_status(DocumentStatus::Cancelled);
        Ok(())
    }

    /// Commit `tx`, then republish item-level averages it invalidated.
    pub fn commit(&self, tx: LedgerTransaction<'_, S>) -> Result<Vec<LedgerEntry>, PostingError> {
        let revalued = tx.revalued_items().clone();
        let entries = tx.commit()?;
        self.refresh_item_rates(&revalued);
        Ok(entries)
    }

    /// Submit a document as one unit of work, retrying on conflicts.
    ///
    /// Returns the rows of every key the document touches.
    pub fn submit(&self, document: &MovementDocument) -> Result<Vec<LedgerEntry>, PostingError> {
        let entries = self.with_retries(document, |tx, doc| self.submit_in(tx, doc))?;
        tracing::info!(
            voucher = %document.voucher_number,
            document_type = ?document.document_type,
            keys = entries.len(),
            "document submitted"
        );
        Ok(entries)
    }

    /// Cancel a submitted document as one unit of work, retrying on conflicts.
    pub fn cancel(&self, document: &MovementDocument) -> Result<(), PostingError> {
        self.with_retries(document, |tx, doc| self.cancel_in(tx, doc))?;
        tracing::info!(
            voucher = %document.voucher_number,
            document_type = ?document.document_type,
            "document cancelled"
        );
        Ok(())
    }

    /// Stock-ledger rows with running balances.
    pub fn get_balance(&self, filter: &BalanceFilter) -> Result<Vec<BalanceRow>, PostingError> {
        Ok(BalanceQueryService::new(&self.store).rows(filter)?)
    }

    /// Closing balance per (item, warehouse) key.
    pub fn get_balance_summary(
        &self,
        filter: &BalanceFilter,
    ) -> Result<Vec<KeyBalance>, PostingError> {
        Ok(BalanceQueryService::new(&self.store).summary(filter)?)
    }

    /// Published item-level reference valuation rate.
    pub fn item_valuation_rate(&self, item_code: &ItemCode) -> Result<Option<f64>, PostingError> {
        Ok(self.store.item_rate(item_code)?)
    }

    fn with_retries<F>(
        &self,
        document: &MovementDocument,
        stage: F,
    ) -> Result<Vec<LedgerEntry>, PostingError>
    where
        F: Fn(&mut LedgerTransaction<'_, S>, &MovementDocument) -> Result<(), PostingError>,
    {
        let mut attempt = 0;
        loop {
            let result = self.begin(document).and_then(|mut tx| {
                stage(&mut tx, document)?;
                self.commit(tx)
            });

            match result {
                Err(err) if err.is_retryable() && attempt < self.config.max_conflict_retries => {
                    attempt += 1;
                    tracing::warn!(
                        voucher = %document.voucher_number,
                        attempt,
                        "retrying after conflict: {err}"
                    );
                }
                Err(err) => {
                    tracing::warn!(voucher = %document.voucher_number, "document rejected: {err}");
                    return Err(err);
                }
                Ok(entries) => return Ok(entries),
            }
        }
    }

    fn plan_for(
        &self,
        tx: &LedgerTransaction<'_, S>,
        document: &MovementDocument,
    ) -> Result<Vec<PlannedLeg>, PostingError> {
        if *tx.voucher_number() != document.voucher_number {
            return Err(PostingError::InvariantViolation(format!(
                "unit of work for {} used with document {}",
                tx.voucher_number(),
                document.voucher_number
            )));
        }
        Ok(document.plan_legs(self.config.transfer_posting)?)
    }

    fn refresh_item_rates(&self, items: &BTreeSet<ItemCode>) {
        for item in items {
            let result = self
                .store
                .entries_for_item(item)
                .map(|entries| moving_average(entries.iter().map(LedgerEntry::state)))
                .and_then(|rate| self.store.publish_item_rate(item, rate).map(|()| rate));

            match result {
                Ok(rate) => tracing::debug!(item = %item, rate, "item valuation rate published"),
                // Derived value: the next inbound posting republishes it.
                Err(err) => {
                    tracing::warn!(item = %item, "failed to publish item valuation rate: {err}")
                }
            }
        }
    }
}

fn negative_stock(leg: &PlannedLeg, resulting: f64) -> PostingError {
    DomainError::negative_stock(
        leg.key.item_code.as_str(),
        leg.key.warehouse.as_str(),
        resulting,
    )
    .into()
}

fn inverse_kind(kind: MovementKind) -> MovementKind {
    kind.direction()
        .map_or(MovementKind::Adjustment, |d| d.inverse().into())
}

fn postings_match(legs: &[PlannedLeg], recorded: &[StockPosting]) -> bool {
    legs.len() == recorded.len()
        && legs
            .iter()
            .zip(recorded)
            .all(|(leg, posting)| leg.key == posting.key && leg.kind == posting.kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use stockledger_core::{VoucherNo, WarehouseId};
    use stockledger_inventory::{LedgerKey, LedgerState, MovementLine, TransferPosting};

    use crate::ledger_store::{CommitBatch, InMemoryLedgerStore, PostingFilter, StoreError};

    /// Store whose next `failures` commits lose a version race.
    #[derive(Debug, Default)]
    struct ContendedStore {
        inner: InMemoryLedgerStore,
        failures: AtomicU32,
    }

    impl ContendedStore {
        fn failing(times: u32) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                failures: AtomicU32::new(times),
            }
        }
    }

    impl LedgerStore for ContendedStore {
        fn get(&self, key: &LedgerKey) -> Result<Option<LedgerEntry>, StoreError> {
            self.inner.get(key)
        }

        fn commit(&self, batch: CommitBatch) -> Result<Vec<LedgerEntry>, StoreError> {
            let lost_race = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lost_race {
                return Err(StoreError::Concurrency("row moved underneath".to_string()));
            }
            self.inner.commit(batch)
        }

        fn entries_for_item(&self, item_code: &ItemCode) -> Result<Vec<LedgerEntry>, StoreError> {
            self.inner.entries_for_item(item_code)
        }

        fn postings(&self, filter: &PostingFilter) -> Result<Vec<StockPosting>, StoreError> {
            self.inner.postings(filter)
        }

        fn document_status(
            &self,
            voucher_number: &VoucherNo,
        ) -> Result<Option<DocumentStatus>, StoreError> {
            self.inner.document_status(voucher_number)
        }

        fn publish_item_rate(&self, item_code: &ItemCode, rate: f64) -> Result<(), StoreError> {
            self.inner.publish_item_rate(item_code, rate)
        }

        fn item_rate(&self, item_code: &ItemCode) -> Result<Option<f64>, StoreError> {
            self.inner.item_rate(item_code)
        }
    }

    fn item() -> ItemCode {
        ItemCode::parse("ITM-1").unwrap()
    }

    fn wh(name: &str) -> Option<WarehouseId> {
        Some(WarehouseId::parse(name).unwrap())
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn doc(
        voucher: &str,
        document_type: DocumentType,
        day: u32,
        lines: Vec<MovementLine>,
    ) -> MovementDocument {
        MovementDocument {
            voucher_number: VoucherNo::parse(voucher).unwrap(),
            document_type,
            posting_date: date(day),
            lines,
        }
    }

    fn line(
        qty: f64,
        rate: f64,
        from: Option<WarehouseId>,
        to: Option<WarehouseId>,
    ) -> MovementLine {
        MovementLine {
            item_code: item(),
            quantity: qty,
            rate,
            from_warehouse: from,
            to_warehouse: to,
        }
    }

    fn receive(voucher: &str, day: u32, qty: f64, rate: f64, to: &str) -> MovementDocument {
        doc(voucher, DocumentType::Receive, day, vec![line(qty, rate, None, wh(to))])
    }

    fn transfer(voucher: &str, day: u32, qty: f64, from: &str, to: &str) -> MovementDocument {
        doc(voucher, DocumentType::Transfer, day, vec![line(qty, 0.0, wh(from), wh(to))])
    }

    fn reconcile(voucher: &str, day: u32, qty: f64, rate: f64, at: &str) -> MovementDocument {
        doc(voucher, DocumentType::Reconciliation, day, vec![line(qty, rate, None, wh(at))])
    }

    fn coordinator() -> PostingCoordinator<InMemoryLedgerStore> {
        PostingCoordinator::new(InMemoryLedgerStore::new(), LedgerConfig::default())
    }

    fn state_at<S: LedgerStore>(c: &PostingCoordinator<S>, warehouse: &str) -> Option<LedgerState> {
        let key = LedgerKey::new(item(), WarehouseId::parse(warehouse).unwrap());
        c.store().get(&key).unwrap().map(|e| e.state())
    }

    #[test]
    fn receipts_and_transfer_follow_moving_average() {
        let c = coordinator();

        let entries = c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].quantity, entries[0].rate), (10.0, 100.0));

        c.submit(&receive("SE-2", 2, 10.0, 200.0, "WH-A")).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(20.0, 150.0)));

        c.submit(&transfer("SE-3", 3, 5.0, "WH-A", "WH-B")).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(15.0, 150.0)));
        // The destination receives at the source's carried rate.
        assert_eq!(state_at(&c, "WH-B"), Some(LedgerState::new(5.0, 150.0)));
    }

    #[test]
    fn empty_document_is_rejected_without_locking() {
        let c = coordinator();
        let err = c.submit(&doc("SE-1", DocumentType::Receive, 1, vec![])).unwrap_err();
        assert!(matches!(err, PostingError::Validation(_)));
        assert!(c.store().postings(&Default::default()).unwrap().is_empty());
    }

    #[test]
    fn missing_warehouse_fails_the_whole_document() {
        let c = coordinator();
        let d = doc(
            "SE-1",
            DocumentType::Receive,
            1,
            vec![line(1.0, 1.0, None, wh("WH-A")), line(1.0, 1.0, wh("WH-B"), None)],
        );
        assert!(matches!(c.submit(&d), Err(PostingError::Validation(_))));
        assert_eq!(state_at(&c, "WH-A"), None);
    }

    #[test]
    fn source_leg_only_mode_posts_only_the_outbound_leg() {
        let c = PostingCoordinator::new(
            InMemoryLedgerStore::new(),
            LedgerConfig::default().with_transfer_posting(TransferPosting::SourceLegOnly),
        );
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        c.submit(&transfer("SE-2", 2, 4.0, "WH-A", "WH-B")).unwrap();

        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(6.0, 100.0)));
        assert_eq!(state_at(&c, "WH-B"), None);
    }

    #[test]
    fn resubmitting_is_idempotent() {
        let c = coordinator();
        let d = receive("SE-1", 1, 10.0, 100.0, "WH-A");
        c.submit(&d).unwrap();
        let again = c.submit(&d).unwrap();

        assert_eq!(again.len(), 1);
        assert_eq!(again[0].quantity, 10.0);
        assert_eq!(c.store().postings(&Default::default()).unwrap().len(), 1);
    }

    #[test]
    fn cancel_restores_receive_exactly() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        let before = state_at(&c, "WH-A");

        let d = receive("SE-2", 2, 7.0, 133.0, "WH-A");
        c.submit(&d).unwrap();
        c.cancel(&d).unwrap();

        assert_eq!(state_at(&c, "WH-A"), before);
        assert_eq!(
            c.store().document_status(&d.voucher_number).unwrap(),
            Some(DocumentStatus::Cancelled)
        );
    }

    #[test]
    fn cancel_restores_both_transfer_legs() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        c.submit(&receive("SE-2", 1, 2.0, 400.0, "WH-B")).unwrap();
        let a = state_at(&c, "WH-A");
        let b = state_at(&c, "WH-B");

        let t = transfer("SE-3", 2, 4.0, "WH-A", "WH-B");
        c.submit(&t).unwrap();
        assert_ne!(state_at(&c, "WH-B"), b);
        c.cancel(&t).unwrap();

        assert_eq!(state_at(&c, "WH-A"), a);
        assert_eq!(state_at(&c, "WH-B"), b);
    }

    #[test]
    fn cancel_after_intervening_posting_issues_at_the_rate_on_hand() {
        let c = coordinator();
        let first = receive("SE-1", 1, 10.0, 100.0, "WH-A");
        c.submit(&first).unwrap();
        c.submit(&receive("SE-2", 2, 10.0, 200.0, "WH-A")).unwrap();

        c.cancel(&first).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 150.0)));
    }

    #[test]
    fn cancelled_expensive_receipt_keeps_rate_positive() {
        let c = coordinator();
        c.submit(&receive("SE-0", 1, 1.0, 1.0, "WH-A")).unwrap();
        let expensive = receive("SE-1", 2, 10.0, 1000.0, "WH-A");
        c.submit(&expensive).unwrap();
        c.submit(&transfer("ST-1", 3, 10.0, "WH-A", "WH-B")).unwrap();
        c.submit(&receive("SE-2", 4, 10.0, 1.0, "WH-A")).unwrap();
        let on_hand = state_at(&c, "WH-A").unwrap();

        c.cancel(&expensive).unwrap();
        let state = state_at(&c, "WH-A").unwrap();
        assert_eq!(state.quantity, 1.0);
        assert_eq!(state.rate, on_hand.rate);
        assert!(state.rate > 0.0);
    }

    #[test]
    fn cancelling_the_opening_receipt_removes_the_row() {
        let c = coordinator();
        let d = receive("SE-1", 1, 10.0, 100.0, "WH-A");
        c.submit(&d).unwrap();
        c.cancel(&d).unwrap();
        assert_eq!(state_at(&c, "WH-A"), None);

        // The key behaves as if it had never been posted to.
        c.submit(&reconcile("SR-1", 2, -3.0, 40.0, "WH-A")).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(-3.0, 40.0)));
    }

    #[test]
    fn cancelling_a_transfer_into_a_new_warehouse_removes_that_row() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        let t = transfer("ST-1", 2, 4.0, "WH-A", "WH-B");
        c.submit(&t).unwrap();
        c.cancel(&t).unwrap();

        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
        assert_eq!(state_at(&c, "WH-B"), None);
    }

    #[test]
    fn cancel_is_idempotent_and_blocks_resubmission() {
        let c = coordinator();
        let d = receive("SE-1", 1, 10.0, 100.0, "WH-A");
        c.submit(&d).unwrap();
        c.cancel(&d).unwrap();
        c.cancel(&d).unwrap();

        assert_eq!(state_at(&c, "WH-A"), None);
        assert!(matches!(c.submit(&d), Err(PostingError::Validation(_))));
    }

    #[test]
    fn cancelling_an_unsubmitted_document_is_rejected() {
        let c = coordinator();
        let err = c.cancel(&receive("SE-9", 1, 1.0, 1.0, "WH-A")).unwrap_err();
        assert!(matches!(err, PostingError::Validation(msg) if msg.contains("not been submitted")));
    }

    #[test]
    fn cancelling_an_edited_document_is_rejected() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();

        let edited = receive("SE-1", 1, 10.0, 100.0, "WH-B");
        assert!(matches!(c.cancel(&edited), Err(PostingError::Validation(_))));
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
    }

    // Reconciliation lines are deltas added to the balance, not absolute
    // target quantities.
    #[test]
    fn reconciliation_adds_delta_to_existing_balance() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        c.submit(&reconcile("SR-1", 2, 5.0, 999.0, "WH-A")).unwrap();

        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(15.0, 100.0)));
    }

    #[test]
    fn reconciliation_rejects_negative_result_without_mutation() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();

        let err = c.submit(&reconcile("SR-1", 2, -15.0, 100.0, "WH-A")).unwrap_err();
        assert!(matches!(err, PostingError::NegativeStock { resulting, .. } if resulting == -5.0));
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
        assert_eq!(c.store().document_status(&VoucherNo::parse("SR-1").unwrap()).unwrap(), None);
    }

    #[test]
    fn reconciliation_on_a_new_key_is_taken_as_given() {
        let c = coordinator();
        c.submit(&reconcile("SR-1", 1, -3.0, 40.0, "WH-A")).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(-3.0, 40.0)));
    }

    #[test]
    fn reconciliation_cancel_rejects_negative_result() {
        let c = coordinator();
        let sr = reconcile("SR-1", 1, 8.0, 10.0, "WH-A");
        c.submit(&sr).unwrap();
        c.submit(&transfer("SE-1", 2, 5.0, "WH-A", "WH-B")).unwrap();

        let err = c.cancel(&sr).unwrap_err();
        assert!(matches!(err, PostingError::NegativeStock { .. }));
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(3.0, 10.0)));
        assert_eq!(
            c.store().document_status(&sr.voucher_number).unwrap(),
            Some(DocumentStatus::Submitted)
        );
    }

    #[test]
    fn negative_line_rolls_back_earlier_lines() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();

        let d = doc(
            "SR-1",
            DocumentType::Reconciliation,
            2,
            vec![line(5.0, 1.0, None, wh("WH-B")), line(-20.0, 1.0, None, wh("WH-A"))],
        );
        assert!(c.submit(&d).is_err());
        assert_eq!(state_at(&c, "WH-B"), None);
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
    }

    #[test]
    fn item_rate_is_republished_after_inbound_postings() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        c.submit(&receive("SE-2", 1, 30.0, 200.0, "WH-B")).unwrap();

        assert_eq!(c.item_valuation_rate(&item()).unwrap(), Some(175.0));
    }

    #[test]
    fn item_rate_is_republished_after_cancelling_a_receipt() {
        let c = coordinator();
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        let second = receive("SE-2", 1, 30.0, 200.0, "WH-B");
        c.submit(&second).unwrap();

        c.cancel(&second).unwrap();
        assert_eq!(c.item_valuation_rate(&item()).unwrap(), Some(100.0));
    }

    #[test]
    fn conflicting_commit_is_retried() {
        let c = PostingCoordinator::new(ContendedStore::failing(2), LedgerConfig::default());
        let entries = c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
        assert_eq!(c.store().inner.postings(&PostingFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn conflict_surfaces_once_retries_run_out() {
        let c = PostingCoordinator::new(
            ContendedStore::failing(1),
            LedgerConfig::default().with_max_conflict_retries(0),
        );
        let err = c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(state_at(&c, "WH-A"), None);

        // The next attempt no longer races.
        c.submit(&receive("SE-1", 1, 10.0, 100.0, "WH-A")).unwrap();
        assert_eq!(state_at(&c, "WH-A"), Some(LedgerState::new(10.0, 100.0)));
    }

    #[test]
    fn caller_driven_transaction_can_roll_back() {
        let c = coordinator();
        let d = receive("SE-1", 1, 10.0, 100.0, "WH-A");

        let mut tx = c.begin(&d).unwrap();
        c.submit_in(&mut tx, &d).unwrap();
        tx.rollback();
        assert_eq!(state_at(&c, "WH-A"), None);

        let mut tx = c.begin(&d).unwrap();
        c.submit_in(&mut tx, &d).unwrap();
        let entries = c.commit(tx).unwrap();
        assert_eq!(entries[0].quantity, 10.0);
    }

    #[test]
    fn transaction_for_another_document_is_refused() {
        let c = coordinator();
        let d1 = receive("SE-1", 1, 10.0, 100.0, "WH-A");
        let d2 = receive("SE-2", 1, 10.0, 100.0, "WH-A");

        let mut tx = c.begin(&d1).unwrap();
        assert!(matches!(
            c.submit_in(&mut tx, &d2),
            Err(PostingError::InvariantViolation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        /// Property: submit then cancel restores the pre-submit state exactly
        /// when nothing else touched the keys.
        #[test]
        fn submit_then_cancel_restores_state(
            opening_qty in 1u32..1_000u32,
            opening_rate in 1u32..1_000u32,
            qty in 1u32..500u32,
            rate in 1u32..1_000u32,
            is_transfer in any::<bool>(),
        ) {
            let c = coordinator();
            let opening = f64::from(opening_qty);
            c.submit(&receive("OPEN-A", 1, opening, f64::from(opening_rate), "WH-A")).unwrap();
            c.submit(&receive("OPEN-B", 1, opening, f64::from(rate), "WH-B")).unwrap();
            let a = state_at(&c, "WH-A");
            let b = state_at(&c, "WH-B");

            let d = if is_transfer {
                transfer("DOC", 2, f64::from(qty), "WH-A", "WH-B")
            } else {
                receive("DOC", 2, f64::from(qty), f64::from(rate), "WH-A")
            };
            c.submit(&d).unwrap();
            c.cancel(&d).unwrap();

            prop_assert_eq!(state_at(&c, "WH-A"), a);
            prop_assert_eq!(state_at(&c, "WH-B"), b);
        }
    }
}
