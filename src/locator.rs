//! Cluster boundary discovery
//!
//! Finds the first feed payload that contains a cluster boundary. Two modes:
//!
//! - **Forward (live join)**: start at the feed head and follow the reported
//!   next index until a payload with a cluster shows up.
//! - **Backward (seek)**: start at the seek target and step back one index
//!   at a time. The walk stops at index zero or after `max_backward_steps`.
//!
//! Each fetch is bounded by the fetch timeout, goes through the retry
//! wrapper and is raced against cancellation. The search sleeps one
//! timeslice between iterations.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::container::find_cluster;
use crate::retry::retry_with_backoff;
use crate::transport::{FeedTransport, fetch_with_timeout};
use crate::types::{FeedIndex, FeedUpdate, PlayerOptions, RetryPolicy, Segment};
use crate::{PlayerError, Result};

/// A payload with a cluster boundary.
#[derive(Debug, Clone)]
pub struct LocatedCluster {
    /// Payload that contains the boundary
    pub segment: Segment,

    /// Byte offset of the cluster ID inside the payload
    pub cluster_offset: usize,

    /// Index to append after the located payload
    pub next_index: FeedIndex,
}

/// Searches the feed for a cluster boundary.
pub struct ClusterLocator {
    transport: Arc<dyn FeedTransport>,
    retry: RetryPolicy,
    poll_interval: Duration,
    fetch_timeout: Duration,
    max_backward_steps: u64,
}

impl ClusterLocator {
    pub fn new(transport: Arc<dyn FeedTransport>, options: &PlayerOptions) -> Self {
        Self {
            transport,
            retry: options.retry,
            poll_interval: options.timeslice(),
            fetch_timeout: options.fetch_timeout(),
            max_backward_steps: options.max_backward_steps,
        }
    }

    /// Locate a cluster, walking backward from `seek` when given and
    /// forward from the feed head otherwise.
    pub async fn locate(&self, seek: Option<FeedIndex>, cancel: &CancellationToken) -> Result<LocatedCluster> {
        match seek {
            Some(target) => self.locate_backward(target, cancel).await,
            None => self.locate_forward(cancel).await,
        }
    }

    async fn locate_forward(&self, cancel: &CancellationToken) -> Result<LocatedCluster> {
        info!("Searching for first cluster from feed head");
        let mut cursor: Option<FeedIndex> = None;
        let mut polls = 0u64;

        loop {
            polls += 1;
            match self.fetch(cursor, cancel).await {
                Ok(update) => {
                    if let Some(located) = Self::inspect(&update) {
                        info!("Cluster found at {} after {} polls", located.segment.index, polls);
                        return Ok(located);
                    }
                    trace!("No cluster in {}, following feed", update.segment.index);
                    cursor = Some(update.next_index());
                }
                Err(e @ PlayerError::Cancelled { .. }) => return Err(e),
                Err(e) if e.is_transient() => {
                    trace!("Waiting for feed to publish {:?}: {}", cursor, e);
                }
                Err(e) => {
                    warn!("Cluster search aborted: {}", e);
                    return Err(e);
                }
            }

            self.pause(cancel).await?;
        }
    }

    async fn locate_backward(&self, target: FeedIndex, cancel: &CancellationToken) -> Result<LocatedCluster> {
        info!("Searching for cluster at or before {}", target);
        let mut cursor = target;
        let mut steps = 0u64;

        loop {
            match self.fetch(Some(cursor), cancel).await {
                Ok(update) => {
                    if let Some(located) = Self::inspect(&update) {
                        info!("Cluster found at {} ({} steps back from {})", located.segment.index, steps, target);
                        return Ok(located);
                    }
                    trace!("No cluster in {}", cursor);
                }
                Err(e @ PlayerError::Cancelled { .. }) => return Err(e),
                // A seek past the published head walks back like a payload without a cluster
                Err(e) if e.is_transient() => {
                    debug!("Seek index {} unavailable: {}", cursor, e);
                }
                Err(e) => {
                    warn!("Cluster search aborted at {}: {}", cursor, e);
                    return Err(e);
                }
            }

            let previous = match cursor.previous() {
                Some(previous) if steps < self.max_backward_steps => previous,
                _ => {
                    warn!("No cluster found within {} steps before {}", steps, target);
                    return Err(PlayerError::NoClusterFound { start: target, steps });
                }
            };
            steps += 1;
            cursor = previous;

            self.pause(cancel).await?;
        }
    }

    async fn fetch(&self, index: Option<FeedIndex>, cancel: &CancellationToken) -> Result<FeedUpdate> {
        let transport = self.transport.as_ref();
        let limit = self.fetch_timeout;
        let fetch = retry_with_backoff(&self.retry, "cluster search fetch", move || {
            fetch_with_timeout(transport, index, limit)
        });

        tokio::select! {
            _ = cancel.cancelled() => Err(PlayerError::cancelled("cluster search")),
            result = fetch => result,
        }
    }

    fn inspect(update: &FeedUpdate) -> Option<LocatedCluster> {
        let cluster_offset = find_cluster(update.segment.as_bytes())?;
        Some(LocatedCluster { segment: update.segment.clone(), cluster_offset, next_index: update.next_index() })
    }

    async fn pause(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PlayerError::cancelled("cluster search")),
            _ = tokio::time::sleep(self.poll_interval) => Ok(()),
        }
    }
}
