//! Core types for feed playback.
//!
//! - [`FeedIndex`] addresses one payload slot of the feed
//! - [`Segment`] pairs a payload with the index it came from
//! - [`FeedUpdate`] is what the transport returns for a fetch
//! - [`PlayerOptions`] and [`RetryPolicy`] configure a session
//! - [`PlayerState`], [`ClusterMeta`] and [`VideoDuration`] describe it

mod feed_index;
mod options;
mod segment;
mod state;

pub use feed_index::FeedIndex;
pub use options::{DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MIME_TYPE, PlayerOptions, RetryPolicy};
pub use segment::{FeedUpdate, Segment};
pub use state::{ClusterMeta, PlaybackPhase, PlayerState, VideoDuration};
