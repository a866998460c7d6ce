//! Movement documents (stock entries and reconciliations) and their
//! decomposition into per-key legs.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ItemCode, VoucherNo, WarehouseId};

use crate::ledger::{LedgerKey, MovementKind};
use crate::valuation::FlowDirection;

/// Kind of movement document.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    Receive,
    Transfer,
    Reconciliation,
}

/// How Transfer lines are posted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferPosting {
    /// Debit the source warehouse and credit the destination.
    #[default]
    DualLeg,
    /// Legacy behavior: only the outbound leg from the source is posted.
    SourceLegOnly,
}

impl FromStr for TransferPosting {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dual_leg" | "dual-leg" => Ok(TransferPosting::DualLeg),
            "source_leg_only" | "source-leg-only" => Ok(TransferPosting::SourceLegOnly),
            other => Err(DomainError::validation(format!(
                "unknown transfer posting mode '{other}'"
            ))),
        }
    }
}

/// One line of a movement document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementLine {
    pub item_code: ItemCode,
    /// Flow magnitude for Receive/Transfer; signed delta for Reconciliation.
    pub quantity: f64,
    #[serde(alias = "item_price")]
    pub rate: f64,
    #[serde(default)]
    pub from_warehouse: Option<WarehouseId>,
    #[serde(default)]
    pub to_warehouse: Option<WarehouseId>,
}

/// Movement document submitted to the posting coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDocument {
    pub voucher_number: VoucherNo,
    pub document_type: DocumentType,
    pub posting_date: NaiveDate,
    pub lines: Vec<MovementLine>,
}

/// Quantity and value totals of a document.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub total_quantity: f64,
    pub total_value: f64,
}

/// A single per-key mutation derived from a document line.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedLeg {
    pub line_index: usize,
    pub key: LedgerKey,
    pub kind: MovementKind,
    /// Magnitude for flows, signed delta for adjustments.
    pub quantity: f64,
    pub price: f64,
    /// Inbound transfer leg: valued at the rate the stock left the source with.
    pub carries_source_rate: bool,
}

impl MovementDocument {
    pub fn totals(&self) -> DocumentTotals {
        self.lines
            .iter()
            .fold(DocumentTotals::default(), |acc, line| DocumentTotals {
                total_quantity: acc.total_quantity + line.quantity,
                total_value: acc.total_value + line.quantity * line.rate,
            })
    }

    /// Check the document as a whole before anything is posted.
    pub fn validate(&self) -> DomainResult<DocumentTotals> {
        if self.lines.is_empty() {
            return Err(DomainError::validation(format!(
                "document {}: at least one line is required",
                self.voucher_number
            )));
        }

        for (idx, line) in self.lines.iter().enumerate() {
            if !line.quantity.is_finite() {
                return Err(DomainError::validation(format!(
                    "line {idx} ({}): quantity must be a finite number",
                    line.item_code
                )));
            }
            if !line.rate.is_finite() || line.rate < 0.0 {
                return Err(DomainError::validation(format!(
                    "line {idx} ({}): rate must be a non-negative number",
                    line.item_code
                )));
            }
            match self.document_type {
                DocumentType::Receive | DocumentType::Transfer if line.quantity <= 0.0 => {
                    return Err(DomainError::validation(format!(
                        "line {idx} ({}): quantity must be positive",
                        line.item_code
                    )));
                }
                DocumentType::Reconciliation if line.quantity == 0.0 => {
                    return Err(DomainError::validation(format!(
                        "line {idx} ({}): reconciliation quantity cannot be zero",
                        line.item_code
                    )));
                }
                _ => {}
            }
        }

        Ok(self.totals())
    }

    /// Decompose the document into per-key legs, in posting order.
    ///
    /// Warehouse roles are resolved here once; cancellation replans from the
    /// same document so reversals land on the warehouses the submission used.
    pub fn plan_legs(&self, transfers: TransferPosting) -> DomainResult<Vec<PlannedLeg>> {
        self.validate()?;

        let mut legs = Vec::with_capacity(self.lines.len() * 2);
        for (idx, line) in self.lines.iter().enumerate() {
            match self.document_type {
                DocumentType::Receive => {
                    let to = line.to_warehouse.as_ref();
                    let wh = require_warehouse(line, to, FlowDirection::Inbound)?;
                    legs.push(flow_leg(idx, line, wh, FlowDirection::Inbound, false));
                }
                DocumentType::Transfer => {
                    let from = require_warehouse(
                        line,
                        line.from_warehouse.as_ref(),
                        FlowDirection::Outbound,
                    )?;
                    legs.push(flow_leg(idx, line, from, FlowDirection::Outbound, false));

                    if transfers == TransferPosting::DualLeg {
                        let to = require_warehouse(
                            line,
                            line.to_warehouse.as_ref(),
                            FlowDirection::Inbound,
                        )?;
                        if to == from {
                            return Err(DomainError::validation(format!(
                                "line {idx} ({}): source and destination warehouse are both {from}",
                                line.item_code
                            )));
                        }
                        legs.push(flow_leg(idx, line, to, FlowDirection::Inbound, true));
                    }
                }
                DocumentType::Reconciliation => {
                    let wh = line
                        .to_warehouse
                        .as_ref()
                        .or(line.from_warehouse.as_ref())
                        .ok_or_else(|| {
                            DomainError::validation(format!(
                                "warehouse not specified for item code {} in reconciliation",
                                line.item_code
                            ))
                        })?;
                    legs.push(PlannedLeg {
                        line_index: idx,
                        key: LedgerKey::new(line.item_code.clone(), wh.clone()),
                        kind: MovementKind::Adjustment,
                        quantity: line.quantity,
                        price: line.rate,
                        carries_source_rate: false,
                    });
                }
            }
        }

        Ok(legs)
    }
}

/// Distinct keys touched by a set of legs, in lock order.
pub fn touched_keys(legs: &[PlannedLeg]) -> BTreeSet<LedgerKey> {
    legs.iter().map(|l| l.key.clone()).collect()
}

fn require_warehouse<'a>(
    line: &MovementLine,
    warehouse: Option<&'a WarehouseId>,
    direction: FlowDirection,
) -> DomainResult<&'a WarehouseId> {
    warehouse.ok_or_else(|| {
        DomainError::validation(format!(
            "warehouse not specified for item code {} in flow {direction}",
            line.item_code
        ))
    })
}

fn flow_leg(
    line_index: usize,
    line: &MovementLine,
    warehouse: &WarehouseId,
    direction: FlowDirection,
    carries_source_rate: bool,
) -> PlannedLeg {
    PlannedLeg {
        line_index,
        key: LedgerKey::new(line.item_code.clone(), warehouse.clone()),
        kind: direction.into(),
        quantity: line.quantity,
        price: line.rate,
        carries_source_rate,
    }
}
