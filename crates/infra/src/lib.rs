//! Infrastructure layer: ledger storage, key locking, posting and reporting.

pub mod balance;
pub mod config;
pub mod error;
pub mod ledger_store;
pub mod locks;
pub mod posting;
pub mod transaction;


pub use balance::{BalanceFilter, BalanceQueryService, BalanceRow, Grouping, KeyBalance};
pub use config::LedgerConfig;
pub use error::PostingError;
pub use ledger_store::{InMemoryLedgerStore, LedgerStore, StoreError};
pub use locks::{KeyLockGuard, KeyLockTable};
pub use posting::PostingCoordinator;
pub use transaction::LedgerTransaction;
