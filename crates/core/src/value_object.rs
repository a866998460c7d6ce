//! Value object trait: equality by value, not identity.
//!
//! Ledger keys, valuation states and flows are value objects: two instances
//! with the same attributes are interchangeable.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by value. To "modify" one, build
/// a new instance (the valuation engine returns a fresh state for every flow
/// instead of mutating the previous one).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
