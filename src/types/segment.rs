//! Feed payloads

use std::sync::Arc;

use super::FeedIndex;

/// One feed payload: an opaque byte sequence bound to a single index.
///
/// The bytes are shared through an `Arc`, so handing a segment from the
/// prefetch buffer to the sink never copies the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Slot the payload was fetched from
    pub index: FeedIndex,

    /// Raw payload bytes
    pub data: Arc<[u8]>,
}

impl Segment {
    pub fn new(index: FeedIndex, data: impl Into<Arc<[u8]>>) -> Self {
        Self { index, data: data.into() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Response of a single feed fetch.
#[derive(Debug, Clone)]
pub struct FeedUpdate {
    /// The payload together with the index the feed reported for it
    pub segment: Segment,

    /// Index the feed says should be fetched next, when it reports one
    pub next_index: Option<FeedIndex>,
}

impl FeedUpdate {
    pub fn new(segment: Segment, next_index: Option<FeedIndex>) -> Self {
        Self { segment, next_index }
    }

    /// Index that follows this update, computed when the feed did not report one.
    pub fn next_index(&self) -> FeedIndex {
        self.next_index.unwrap_or_else(|| self.segment.index.next())
    }
}
