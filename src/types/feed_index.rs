//! Position of a payload slot within a feed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unsigned position of one payload slot in an append-only feed.
///
/// Indices are totally ordered and immutable: arithmetic returns a new
/// index instead of mutating the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedIndex(u64);

impl FeedIndex {
    /// The first slot of a feed, which holds the container metadata.
    pub const FIRST: FeedIndex = FeedIndex(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }

    /// The following slot. Saturates at the largest representable index.
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The preceding slot, or `None` at the start of the feed.
    pub const fn previous(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Number of slots between `self` and a later index.
    pub fn distance_to(self, later: FeedIndex) -> u64 {
        later.0.saturating_sub(self.0)
    }
}

impl From<u64> for FeedIndex {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<FeedIndex> for u64 {
    fn from(index: FeedIndex) -> Self {
        index.0
    }
}

/// Feeds address slots by their 8-byte big-endian value, rendered as hex.
impl fmt::Display for FeedIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
