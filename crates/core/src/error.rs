//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic business failures. Storage and
/// concurrency concerns belong to the infra layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A value or document failed validation (e.g. empty line list, missing warehouse).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A movement would drive the balance of an (item, warehouse) key below zero.
    #[error(
        "stock for item {item_code} in warehouse {warehouse} cannot go negative \
         (resulting quantity {resulting})"
    )]
    NegativeStock {
        item_code: String,
        warehouse: String,
        resulting: f64,
    },

    /// An identifier was invalid (e.g. blank code, parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn negative_stock(
        item_code: impl Into<String>,
        warehouse: impl Into<String>,
        resulting: f64,
    ) -> Self {
        Self::NegativeStock {
            item_code: item_code.into(),
            warehouse: warehouse.into(),
            resulting,
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_stock_message_names_the_key() {
        let err = DomainError::negative_stock("ITM-1", "WH-A", -5.0);
        let msg = err.to_string();
        assert!(msg.contains("ITM-1"));
        assert!(msg.contains("WH-A"));
        assert!(msg.contains("-5"));
    }
}
