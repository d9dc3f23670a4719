//! Player session state

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FeedIndex;

/// Lifecycle phase of an attached player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackPhase {
    /// Bound to a feed and sink, nothing fetched yet
    #[default]
    Attached,

    /// Locating a cluster and appending the initialization segment
    Initializing,

    /// Append timer running
    Playing,

    /// Append timer stopped, position kept
    Paused,
}

/// Snapshot of the mutable playback state of one session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerState {
    /// Next index to append; `None` until a cluster is located
    pub current_index: Option<FeedIndex>,

    /// Target of a pending seek, consumed by the next initialization
    pub seek_target: Option<FeedIndex>,

    pub is_playing: bool,

    /// Set while an initialization is in flight
    pub is_loading: bool,

    pub phase: PlaybackPhase,
}

/// Timing values read from the container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterMeta {
    /// Length of one timestamp tick, in seconds
    pub time_scale_seconds: f64,

    /// Timestamp of the located cluster, in seconds
    pub cluster_timestamp_seconds: f64,
}

/// Approximate length of the published feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDuration {
    /// Highest index the feed has published
    pub index: FeedIndex,

    /// `index` multiplied by the timeslice
    pub duration: Duration,
}
