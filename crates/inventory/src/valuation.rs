//! Moving-average valuation engine.
//!
//! Pure functions over [`LedgerState`]: the same inputs always yield the same
//! state, so every transition can be tested without a store.

use serde::{Deserialize, Serialize};

use stockledger_core::ValueObject;

/// Direction of a single flow of quantity into or out of a warehouse.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowDirection {
    Inbound,
    Outbound,
}

impl FlowDirection {
    pub fn inverse(self) -> Self {
        match self {
            FlowDirection::Inbound => FlowDirection::Outbound,
            FlowDirection::Outbound => FlowDirection::Inbound,
        }
    }

    /// Sign applied to a flow magnitude (+1 inbound, -1 outbound).
    pub fn sign(self) -> f64 {
        match self {
            FlowDirection::Inbound => 1.0,
            FlowDirection::Outbound => -1.0,
        }
    }
}

impl core::fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FlowDirection::Inbound => f.write_str("in"),
            FlowDirection::Outbound => f.write_str("out"),
        }
    }
}

/// Quantity and moving-average rate of one (item, warehouse) key.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub quantity: f64,
    pub rate: f64,
}

impl ValueObject for LedgerState {}

impl LedgerState {
    pub fn new(quantity: f64, rate: f64) -> Self {
        Self { quantity, rate }
    }

    /// Stock value at the current rate.
    pub fn value(&self) -> f64 {
        self.quantity * self.rate
    }
}

/// Apply one flow to the state of a key.
///
/// `flow_qty` is the magnitude of the movement; `direction` signs it.
///
/// - no existing state: the flow opens the key at `flow_rate`
/// - inbound: the rate moves to the weighted average of stock on hand and the
///   incoming lot (`0` when the resulting quantity is zero)
/// - outbound: quantity drops, the rate is carried unchanged; the result may
///   be negative
pub fn apply_flow(
    existing: Option<LedgerState>,
    flow_qty: f64,
    flow_rate: f64,
    direction: FlowDirection,
) -> LedgerState {
    let Some(state) = existing else {
        return LedgerState::new(direction.sign() * flow_qty, flow_rate);
    };

    match direction {
        FlowDirection::Inbound => {
            let quantity = state.quantity + flow_qty;
            let rate = if quantity != 0.0 {
                (state.value() + flow_qty * flow_rate) / quantity
            } else {
                0.0
            };
            LedgerState { quantity, rate }
        }
        FlowDirection::Outbound => LedgerState {
            quantity: state.quantity - flow_qty,
            rate: state.rate,
        },
    }
}

/// Replay the inverse of a flow previously applied with [`apply_flow`].
///
/// Reversing a receipt is an issue of the same quantity, so the rate on hand
/// is kept. Reversing an issue re-admits the quantity at `flow_rate`, which
/// must be the rate the stock left with.
pub fn reverse_flow(
    current: Option<LedgerState>,
    flow_qty: f64,
    flow_rate: f64,
    original: FlowDirection,
) -> LedgerState {
    apply_flow(current, flow_qty, flow_rate, original.inverse())
}

/// Reconciliation adjustment: add a signed `delta` to the quantity, keeping
/// the rate. A key without state opens at `rate`.
pub fn adjust(existing: Option<LedgerState>, delta: f64, rate: f64) -> LedgerState {
    match existing {
        Some(state) => LedgerState {
            quantity: state.quantity + delta,
            rate: state.rate,
        },
        None => LedgerState::new(delta, rate),
    }
}

/// Weighted average rate over several states: `Σ(qty*rate) / Σqty`.
///
/// Returns `0` when the total quantity is zero.
pub fn moving_average(states: impl IntoIterator<Item = LedgerState>) -> f64 {
    let (value, quantity) = states
        .into_iter()
        .fold((0.0, 0.0), |(v, q), s| (v + s.value(), q + s.quantity));

    if quantity != 0.0 { value / quantity } else { 0.0 }
}
