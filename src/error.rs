//! Error types for feed playback.
//!
//! Every fallible operation in the crate returns [`PlayerError`]. The variants
//! follow the way failures are handled during playback:
//!
//! ## Error Categories
//!
//! - **Transient transport errors**: the feed has not published an index yet,
//!   or a fetch timed out. These are expected on a live feed and are retried
//!   silently.
//! - **Fatal transport errors**: anything else the feed reader reports. Logged
//!   by the append path, surfaced by cluster location once retries run out.
//! - **Malformed container**: a required marker or VarInt could not be decoded.
//! - **Configuration errors**: invalid [`PlayerOptions`](crate::PlayerOptions).
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use feedcast::{FeedIndex, PlayerError};
//!
//! let error = PlayerError::not_published(Some(FeedIndex::new(42)));
//! assert!(error.is_transient());
//! assert!(error.is_retryable());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::FeedIndex;

/// Result type alias for playback operations.
pub type Result<T, E = PlayerError> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for playback operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("Feed index {} is not published yet", display_index(.index))]
    NotPublished { index: Option<FeedIndex> },

    #[error("Feed fetch timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Feed transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Malformed container in {context}: {details}")]
    MalformedContainer { context: String, details: String },

    #[error("Malformed VarInt at offset {offset}: {details}")]
    MalformedVarInt { offset: usize, details: String },

    #[error("No cluster found searching backward from {start} ({steps} steps)")]
    NoClusterFound { start: FeedIndex, steps: u64 },

    #[error("Invalid configuration for '{field}': {reason}")]
    Configuration { field: String, reason: String },

    #[error("Media sink failed during {operation}")]
    Sink {
        operation: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("{operation} was cancelled")]
    Cancelled { operation: String },
}

fn display_index(index: &Option<FeedIndex>) -> String {
    match index {
        Some(index) => index.to_string(),
        None => "<latest>".to_string(),
    }
}

impl PlayerError {
    /// Returns whether this is an expected condition of a growing feed.
    ///
    /// Transient errors are never logged above debug level.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlayerError::NotPublished { .. } | PlayerError::Timeout { .. })
    }

    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            PlayerError::NotPublished { .. } => true,
            PlayerError::Timeout { .. } => true,
            PlayerError::Transport { .. } => true,
            PlayerError::MalformedContainer { .. } => false,
            PlayerError::MalformedVarInt { .. } => false,
            PlayerError::NoClusterFound { .. } => false,
            PlayerError::Configuration { .. } => false,
            PlayerError::Sink { .. } => false,
            PlayerError::Cancelled { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            PlayerError::NotPublished { .. } => vec![
                "Wait for the publisher to upload the next segment",
                "Seek to an index that has already been published",
            ],
            PlayerError::Timeout { .. } => vec![
                "Check connectivity to the feed gateway",
                "Increase the retry budget",
            ],
            PlayerError::Transport { .. } => vec![
                "Check the feed owner and topic",
                "Verify the feed gateway is reachable",
                "Retry playback once the gateway recovers",
            ],
            PlayerError::MalformedContainer { .. } | PlayerError::MalformedVarInt { .. } => vec![
                "Verify the publisher produces WebM segments",
                "Check that the metadata slot holds the container header",
            ],
            PlayerError::NoClusterFound { .. } => vec![
                "Seek to a later index",
                "Increase max_backward_steps",
                "Verify the feed contains cluster boundaries",
            ],
            PlayerError::Configuration { .. } => vec![
                "Check player options against their documented ranges",
            ],
            PlayerError::Sink { .. } => vec![
                "Check that the sink accepts the configured mime type",
                "Restart playback to reset the sink",
            ],
            PlayerError::Cancelled { .. } => vec!["Attach a new player session"],
        }
    }

    /// Helper constructor for unpublished feed indices.
    pub fn not_published(index: Option<FeedIndex>) -> Self {
        PlayerError::NotPublished { index }
    }

    /// Helper constructor for transport failures.
    pub fn transport(reason: impl Into<String>) -> Self {
        PlayerError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport failures with source.
    pub fn transport_with_source(reason: impl Into<String>, source: BoxError) -> Self {
        PlayerError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for container parse failures.
    pub fn malformed(context: impl Into<String>, details: impl Into<String>) -> Self {
        PlayerError::MalformedContainer { context: context.into(), details: details.into() }
    }

    /// Helper constructor for VarInt decode failures.
    pub fn malformed_varint(offset: usize, details: impl Into<String>) -> Self {
        PlayerError::MalformedVarInt { offset, details: details.into() }
    }

    /// Helper constructor for invalid options.
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        PlayerError::Configuration { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for sink failures.
    pub fn sink(operation: impl Into<String>) -> Self {
        PlayerError::Sink { operation: operation.into(), source: None }
    }

    /// Helper constructor for sink failures with source.
    pub fn sink_with_source(operation: impl Into<String>, source: BoxError) -> Self {
        PlayerError::Sink { operation: operation.into(), source: Some(source) }
    }

    /// Helper constructor for fetches that ran past their bound.
    pub fn timeout(duration: Duration) -> Self {
        PlayerError::Timeout { duration }
    }

    /// Helper constructor for cancelled operations.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        PlayerError::Cancelled { operation: operation.into() }
    }
}

impl From<serde_yaml_ng::Error> for PlayerError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        PlayerError::Configuration { field: "<yaml>".to_string(), reason: err.to_string() }
    }
}
