//! Errors surfaced by the posting coordinator and balance queries.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::ledger_store::StoreError;
use crate::locks::LockPoisoned;

/// Posting operation error.
///
/// - **Validation / NegativeStock**: deterministic, nothing was written
/// - **ConcurrencyConflict**: a per-key version or document status changed
///   underneath the unit of work; retrying the whole submission is safe
/// - **Store / Internal**: infrastructure failures
#[derive(Debug, Error)]
pub enum PostingError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error(
        "stock for item {item_code} in warehouse {warehouse} cannot go negative \
         (resulting quantity {resulting})"
    )]
    NegativeStock {
        item_code: String,
        warehouse: String,
        resulting: f64,
    },

    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("ledger store failure: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PostingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller should retry the whole submission.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PostingError::ConcurrencyConflict(_))
    }
}

impl From<DomainError> for PostingError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => PostingError::Validation(msg),
            DomainError::InvalidId(msg) => PostingError::Validation(msg),
            DomainError::NegativeStock {
                item_code,
                warehouse,
                resulting,
            } => PostingError::NegativeStock {
                item_code,
                warehouse,
                resulting,
            },
        }
    }
}

impl From<StoreError> for PostingError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => PostingError::ConcurrencyConflict(msg),
            other => PostingError::Store(other),
        }
    }
}

impl From<LockPoisoned> for PostingError {
    fn from(value: LockPoisoned) -> Self {
        PostingError::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_become_retryable() {
        let err = PostingError::from(StoreError::Concurrency("stale".to_string()));
        assert!(err.is_retryable());
        assert!(!PostingError::from(StoreError::Poisoned).is_retryable());
    }

    #[test]
    fn domain_negative_stock_keeps_its_fields() {
        let err = PostingError::from(DomainError::negative_stock("ITM-1", "WH-A", -5.0));
        match err {
            PostingError::NegativeStock {
                item_code,
                warehouse,
                resulting,
            } => {
                assert_eq!(item_code, "ITM-1");
                assert_eq!(warehouse, "WH-A");
                assert_eq!(resulting, -5.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
