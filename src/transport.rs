//! Feed transport trait

use std::time::Duration;

use crate::types::{FeedIndex, FeedUpdate};
use crate::{PlayerError, Result};

/// Trait for feed readers
///
/// A transport fetches one payload slot of an append-only feed. It hides
/// the network protocol, addressing and authentication of the feed; the
/// player only needs indexed reads.
#[async_trait::async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Fetch the payload stored at `index`, or the latest payload when `None`
    ///
    /// Returns:
    /// - `Ok(update)` - Payload plus the index it was read from
    /// - `Err(PlayerError::NotPublished { .. })` - Slot does not exist yet
    /// - `Err(e)` - Any other transport failure
    ///
    /// Implementations should report a slot that does not exist yet as
    /// [`PlayerError::NotPublished`](crate::PlayerError::NotPublished) so
    /// callers can tell an expected gap from a real failure.
    async fn fetch_payload(&self, index: Option<FeedIndex>) -> Result<FeedUpdate>;
}

/// Fetch through `transport`, giving up after `limit`.
///
/// An expired fetch is reported as [`PlayerError::Timeout`], which callers
/// treat like any other transient gap.
pub async fn fetch_with_timeout(
    transport: &dyn FeedTransport,
    index: Option<FeedIndex>,
    limit: Duration,
) -> Result<FeedUpdate> {
    match tokio::time::timeout(limit, transport.fetch_payload(index)).await {
        Ok(result) => result,
        Err(_) => Err(PlayerError::timeout(limit)),
    }
}
