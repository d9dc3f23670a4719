//! Progressive playback of WebM video published as an append-only indexed feed.
//!
//! A producer publishes a WebM stream as a sequence of opaque payloads, one
//! per [`FeedIndex`]. Feedcast joins that feed at any point, finds a cluster
//! boundary, synthesizes an initialization segment and keeps appending
//! payloads to a media sink in index order while prefetching ahead.
//!
//! # Features
//!
//! - **Live join**: follow the feed head until a cluster shows up
//! - **Seek**: walk back from any index to the nearest cluster
//! - **Look-ahead prefetch**: overlap network latency with playback
//! - **Strict ordering**: appends never overlap and never go backwards
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use feedcast::{FeedPlayer, FeedTransport, MediaSink, PlayerOptions, PlayerSignal};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! async fn watch(transport: Arc<dyn FeedTransport>, sink: Arc<dyn MediaSink>) -> feedcast::Result<()> {
//!     let player = FeedPlayer::attach(transport, sink, PlayerOptions::default())?;
//!     let mut playing = player.events().subscribe(PlayerSignal::IsPlaying);
//!
//!     player.play().await?;
//!     while let Some(is_playing) = playing.next().await {
//!         println!("playing: {is_playing}");
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
pub mod container;
mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;

// External interfaces
pub mod sink;
pub mod transport;

// Playback pipeline
pub mod events;
pub mod locator;
pub mod player;
pub mod prefetch;
pub mod queue;
pub mod retry;

// Core exports
pub use error::*;
pub use types::*;

pub use events::{PlayerEvents, PlayerSignal};
pub use locator::{ClusterLocator, LocatedCluster};
pub use player::FeedPlayer;
pub use prefetch::{BufferEntry, Consumed, SegmentPrefetcher};
pub use queue::{OrderedTaskQueue, QueueOptions};
pub use retry::retry_with_backoff;
pub use sink::MediaSink;
pub use transport::{FeedTransport, fetch_with_timeout};
