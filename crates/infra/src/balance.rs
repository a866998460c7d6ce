//! Balance Query Service.
//!
//! Replays the movement log into stock-ledger rows: each posting annotated
//! with in/out quantities and values plus running balance, value and
//! average rate. Running figures are a left fold over the filtered, ordered
//! postings, either per (item, warehouse) key or over one combined stream.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{ItemCode, VoucherNo, WarehouseId};
use stockledger_inventory::{LedgerKey, MovementKind, StockPosting};

use crate::ledger_store::{LedgerStore, PostingFilter, StoreError};

/// How running balances are accumulated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One running balance per (item, warehouse) key.
    #[default]
    PerKey,
    /// One running balance across every returned posting.
    Combined,
}

/// Report filter. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub item_code: Option<ItemCode>,
    pub warehouse: Option<WarehouseId>,
    pub grouping: Grouping,
    pub include_cancelled: bool,
}

impl BalanceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }

    pub fn item(mut self, item_code: ItemCode) -> Self {
        self.item_code = Some(item_code);
        self
    }

    pub fn warehouse(mut self, warehouse: WarehouseId) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    fn posting_filter(&self) -> PostingFilter {
        PostingFilter {
            from_date: self.from_date,
            to_date: self.to_date,
            item_code: self.item_code.clone(),
            warehouse: self.warehouse.clone(),
            voucher_number: None,
            include_cancelled: self.include_cancelled,
        }
    }
}

/// One stock-ledger report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRow {
    pub posting_date: NaiveDate,
    pub sequence: u64,
    pub item_code: ItemCode,
    pub warehouse: WarehouseId,
    pub voucher_number: VoucherNo,
    pub kind: MovementKind,
    pub quantity: f64,
    pub rate: f64,
    pub in_qty: f64,
    pub out_qty: f64,
    pub in_value: f64,
    pub out_value: f64,
    pub balance_qty: f64,
    pub balance_value: f64,
    /// `balance_value / balance_qty`, `0` on an empty balance.
    pub avg_rate: f64,
    pub valuation_rate: f64,
    pub is_cancelled: bool,
}

/// Closing figures of one key over the filtered range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBalance {
    pub key: LedgerKey,
    pub balance_qty: f64,
    pub balance_value: f64,
    pub avg_rate: f64,
    pub last_posting_date: NaiveDate,
}

#[derive(Debug, Default, Clone, Copy)]
struct Running {
    qty: f64,
    value: f64,
}

/// Annotate ordered postings with running figures.
pub fn fold_rows(postings: &[StockPosting], grouping: Grouping) -> Vec<BalanceRow> {
    let mut per_key: HashMap<&LedgerKey, Running> = HashMap::new();
    let mut combined = Running::default();

    postings
        .iter()
        .map(|p| {
            let running = match grouping {
                Grouping::PerKey => per_key.entry(&p.key).or_default(),
                Grouping::Combined => &mut combined,
            };
            running.qty += p.quantity;
            running.value += p.value();

            let in_qty = if p.quantity > 0.0 { p.quantity } else { 0.0 };
            let out_qty = if p.quantity < 0.0 { -p.quantity } else { 0.0 };

            BalanceRow {
                posting_date: p.posting_date,
                sequence: p.sequence,
                item_code: p.key.item_code.clone(),
                warehouse: p.key.warehouse.clone(),
                voucher_number: p.voucher_number.clone(),
                kind: p.kind,
                quantity: p.quantity,
                rate: p.rate,
                in_qty,
                out_qty,
                in_value: in_qty * p.rate,
                out_value: out_qty * p.rate,
                balance_qty: running.qty,
                balance_value: running.value,
                avg_rate: if running.qty != 0.0 {
                    running.value / running.qty
                } else {
                    0.0
                },
                valuation_rate: p.rate,
                is_cancelled: p.is_cancelled,
            }
        })
        .collect()
}

/// Read-side service over a ledger store.
#[derive(Debug)]
pub struct BalanceQueryService<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> BalanceQueryService<'a, S>
where
    S: LedgerStore + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Postings in `(posting_date, sequence)` order with running figures.
    pub fn rows(&self, filter: &BalanceFilter) -> Result<Vec<BalanceRow>, StoreError> {
        let postings = self.store.postings(&filter.posting_filter())?;
        Ok(fold_rows(&postings, filter.grouping))
    }

    /// Closing balance per key over the filtered range, ordered by key.
    pub fn summary(&self, filter: &BalanceFilter) -> Result<Vec<KeyBalance>, StoreError> {
        let postings = self.store.postings(&filter.posting_filter())?;
        let rows = fold_rows(&postings, Grouping::PerKey);

        let mut closing: BTreeMap<LedgerKey, KeyBalance> = BTreeMap::new();
        for row in rows {
            let key = LedgerKey::new(row.item_code, row.warehouse);
            closing.insert(
                key.clone(),
                KeyBalance {
                    key,
                    balance_qty: row.balance_qty,
                    balance_value: row.balance_value,
                    avg_rate: row.avg_rate,
                    last_posting_date: row.posting_date,
                },
            );
        }

        Ok(closing.into_values().collect())
    }
}
