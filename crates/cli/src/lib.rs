//! Batch runner: replays submit/cancel operations against an in-memory
//! ledger and reports the resulting stock ledger.
//!
//! Input is either a bare array of operations or an object with
//! `operations` and an optional report `filter`:
//!
//! ```json
//! {
//!   "operations": [
//!     { "action": "submit", "document": { "voucher_number": "SE-1", ... } },
//!     { "action": "cancel", "document": { "voucher_number": "SE-1", ... } }
//!   ],
//!   "filter": { "warehouse": "WH-A" }
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};

use stockledger_infra::{
    BalanceFilter, BalanceRow, InMemoryLedgerStore, KeyBalance, LedgerConfig, PostingCoordinator,
};
use stockledger_inventory::MovementDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Submit,
    Cancel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub action: Action,
    pub document: MovementDocument,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    pub operations: Vec<Operation>,
    #[serde(default)]
    pub filter: BalanceFilter,
    /// Keep going after a rejected operation instead of aborting the batch.
    #[serde(default)]
    pub continue_on_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub index: usize,
    pub action: Action,
    pub voucher_number: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub rows: Vec<BalanceRow>,
    pub summary: Vec<KeyBalance>,
    pub rejected: Vec<Rejection>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptInput {
    Operations(Vec<Operation>),
    Script(Script),
}

pub fn parse_script(input: &str) -> anyhow::Result<Script> {
    let parsed: ScriptInput =
        serde_json::from_str(input).context("invalid operations document")?;
    Ok(match parsed {
        ScriptInput::Operations(operations) => Script {
            operations,
            ..Script::default()
        },
        ScriptInput::Script(script) => script,
    })
}

/// Apply every operation in order, then query the balance report.
pub fn run(script: &Script, config: LedgerConfig) -> anyhow::Result<Report> {
    let coordinator = PostingCoordinator::new(InMemoryLedgerStore::new(), config);
    let mut rejected = Vec::new();

    for (index, op) in script.operations.iter().enumerate() {
        let result = match op.action {
            Action::Submit => coordinator.submit(&op.document).map(|_| ()),
            Action::Cancel => coordinator.cancel(&op.document),
        };

        if let Err(err) = result {
            if !script.continue_on_error {
                return Err(err).with_context(|| {
                    format!(
                        "operation {index} ({:?} {}) failed",
                        op.action, op.document.voucher_number
                    )
                });
            }
            rejected.push(Rejection {
                index,
                action: op.action,
                voucher_number: op.document.voucher_number.to_string(),
                error: err.to_string(),
            });
        }
    }

    Ok(Report {
        rows: coordinator.get_balance(&script.filter)?,
        summary: coordinator.get_balance_summary(&script.filter)?,
        rejected,
    })
}
