//! Aggregator replies: per-batch answers and the final winner set.

use std::collections::BTreeSet;

/// Aggregator verdict on a submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Batch stored.
    Success,
    /// Batch rejected.
    Fail,
}

impl Answer {
    /// Map a wire byte: `0` is success, anything else is a failure.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            Self::Success
        } else {
            Self::Fail
        }
    }

    /// Canonical wire byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Fail => 1,
        }
    }

    /// Log-friendly result label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

/// Document ids announced as winners once every agency has reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WinnerSet(BTreeSet<u32>);

impl WinnerSet {
    /// Empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document id; duplicates collapse.
    pub fn insert(&mut self, document: u32) -> bool {
        self.0.insert(document)
    }

    /// Whether `document` won.
    #[must_use]
    pub fn contains(&self, document: u32) -> bool {
        self.0.contains(&document)
    }

    /// Number of distinct winners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nobody won.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Winners in ascending document order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for WinnerSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
