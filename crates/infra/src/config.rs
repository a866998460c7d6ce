//! Configuration loading and representation.

use serde::{Deserialize, Serialize};

use stockledger_inventory::TransferPosting;

pub const ENV_TRANSFER_POSTING: &str = "STOCK_LEDGER_TRANSFER_POSTING";
pub const ENV_CONFLICT_RETRIES: &str = "STOCK_LEDGER_CONFLICT_RETRIES";

const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Posting coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Whether Transfer lines post both legs or only the source leg.
    pub transfer_posting: TransferPosting,
    /// How many times `submit`/`cancel` retry after a concurrency conflict.
    pub max_conflict_retries: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            transfer_posting: TransferPosting::default(),
            max_conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl LedgerConfig {
    /// Read settings from the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`; unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TRANSFER_POSTING) {
            match raw.parse() {
                Ok(mode) => config.transfer_posting = mode,
                Err(err) => tracing::warn!(
                    "{ENV_TRANSFER_POSTING}={raw:?} ignored ({err}); using {:?}",
                    config.transfer_posting
                ),
            }
        }

        if let Some(raw) = lookup(ENV_CONFLICT_RETRIES) {
            match raw.trim().parse() {
                Ok(retries) => config.max_conflict_retries = retries,
                Err(err) => tracing::warn!(
                    "{ENV_CONFLICT_RETRIES}={raw:?} ignored ({err}); using {}",
                    config.max_conflict_retries
                ),
            }
        }

        config
    }

    pub fn with_transfer_posting(mut self, transfer_posting: TransferPosting) -> Self {
        self.transfer_posting = transfer_posting;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }
}
