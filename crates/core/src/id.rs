//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Item code (e.g. `ITM-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemCode(String);

/// Warehouse name (e.g. `WH-A`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WarehouseId(String);

/// Number of the movement document (voucher) that originated a posting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoucherNo(String);

/// Identifier of a single row in the append-only movement log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostingId(Uuid);

macro_rules! impl_code_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Parse a code, rejecting blank input. Surrounding whitespace is trimmed.
            pub fn parse(value: impl AsRef<str>) -> Result<Self, DomainError> {
                let trimmed = value.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(DomainError::invalid_id(format!("{} cannot be empty", $name)));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $t {
            type Error = DomainError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::parse(value)
            }
        }

        impl From<$t> for String {
            fn from(value: $t) -> Self {
                value.0
            }
        }
    };
}

impl_code_newtype!(ItemCode, "item_code");
impl_code_newtype!(WarehouseId, "warehouse");
impl_code_newtype!(VoucherNo, "voucher_number");

impl PostingId {
    /// Create a new time-ordered (UUIDv7) identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PostingId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PostingId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_trimmed() {
        let item = ItemCode::parse("  ITM-1 ").unwrap();
        assert_eq!(item.as_str(), "ITM-1");
        assert_eq!(item.to_string(), "ITM-1");
    }

    #[test]
    fn blank_codes_are_rejected() {
        assert!(matches!(
            WarehouseId::parse("   "),
            Err(DomainError::InvalidId(_))
        ));
        assert!("".parse::<VoucherNo>().is_err());
    }

    #[test]
    fn codes_deserialize_through_validation() {
        let wh: WarehouseId = serde_json::from_str("\"WH-A\"").unwrap();
        assert_eq!(wh.as_str(), "WH-A");
        assert!(serde_json::from_str::<WarehouseId>("\"\"").is_err());
    }
}
