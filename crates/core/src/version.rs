//! Version markers for optimistic concurrency.

/// Entities whose every persisted write bumps a version counter.
pub trait Versioned {
    /// Current version as last read from (or written to) the store.
    ///
    /// Starts at 1 for freshly seeded rows and increases by exactly one per
    /// successful write.
    fn version(&self) -> i64;
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (writes made under an exclusive row lock).
    Any,
    /// Require the stored row to be at an exact version.
    Exact(i64),
}

impl ExpectedVersion {
    /// Whether a row stored at `actual` satisfies this expectation.
    pub fn matches(self, actual: i64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }
}
