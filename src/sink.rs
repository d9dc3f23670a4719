//! Media sink trait

use std::sync::Arc;

use crate::Result;

/// Trait for media rendering sinks
///
/// The sink owns the decode buffer and playback clock. It is shared between
/// the player and its append task, so every method takes `&self`.
///
/// Appends must be applied in call order with at most one in flight; a sink
/// that is busy queues the bytes internally.
#[async_trait::async_trait]
pub trait MediaSink: Send + Sync + 'static {
    /// Create the decode buffer for the given mime descriptor
    ///
    /// Called once per initialization, after any [`reset`](MediaSink::reset).
    async fn open(&self, mime_type: &str) -> Result<()>;

    /// Queue bytes for decoding
    async fn append(&self, bytes: Arc<[u8]>) -> Result<()>;

    /// Move the playback clock to `seconds`
    async fn set_clock_position(&self, seconds: f64) -> Result<()>;

    /// Start advancing the playback clock
    async fn start_playback(&self) -> Result<()>;

    /// Stop advancing the playback clock
    async fn pause_playback(&self) -> Result<()>;

    /// Drop all buffered content and the decode buffer
    async fn reset(&self) -> Result<()>;
}
