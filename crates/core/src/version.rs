//! Optimistic concurrency tokens for versioned rows.

/// Optimistic concurrency expectation for a versioned row or stream.
///
/// Version `0` means "does not exist yet"; every successful write bumps the
/// version by one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (blind upserts, migrations, etc.).
    Any,
    /// Require the row to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    /// Expect the row to be absent.
    pub const ABSENT: ExpectedVersion = ExpectedVersion::Exact(0);

    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_requires_the_same_version() {
        assert!(ExpectedVersion::ABSENT.matches(0));
        assert!(!ExpectedVersion::ABSENT.matches(1));
        assert!(!ExpectedVersion::Exact(3).matches(4));
    }
}
