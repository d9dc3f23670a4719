//! Player configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FeedIndex;
use crate::{PlayerError, Result};

/// Mime descriptor handed to the sink when none is configured.
pub const DEFAULT_MIME_TYPE: &str = "video/webm; codecs=\"vp9,opus\"";

/// Fetch bound used when none is configured.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;

/// Bounded retry applied to individual feed fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles on every further attempt
    pub initial_delay_ms: u64,

    /// Upper bound for the doubled delay
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_delay_ms: 50, max_delay_ms: 1000 }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let delay = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

/// Options for a [`FeedPlayer`](crate::FeedPlayer) session.
///
/// Every field has a default, so a YAML document only needs to name the
/// values it changes:
///
/// ```rust
/// use feedcast::PlayerOptions;
///
/// let options = PlayerOptions::from_yaml_str("timeslice_ms: 1000\nlook_ahead: 4\n").unwrap();
/// assert_eq!(options.timeslice().as_millis(), 1000);
/// assert_eq!(options.look_ahead, 4);
/// assert_eq!(options.retry.max_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerOptions {
    /// Interval between append ticks; also the duration of one published segment
    pub timeslice_ms: u64,

    /// Number of feed indices kept in flight ahead of playback
    pub look_ahead: usize,

    /// Delay between the first append tick and starting sink playback
    pub init_buffer_ms: u64,

    /// Hard stop for the backward cluster search during a seek
    pub max_backward_steps: u64,

    /// Feed slot holding the container metadata
    pub metadata_index: FeedIndex,

    /// Mime descriptor used to open the sink
    pub mime_type: String,

    /// Upper bound for a single feed fetch; an expired fetch counts as transient
    pub fetch_timeout_ms: u64,

    /// Retry applied to cluster-search and metadata fetches
    pub retry: RetryPolicy,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            timeslice_ms: 2000,
            look_ahead: 2,
            init_buffer_ms: 0,
            max_backward_steps: 256,
            metadata_index: FeedIndex::FIRST,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl PlayerOptions {
    /// Parse options from YAML and validate them.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let options: PlayerOptions = serde_yaml_ng::from_str(yaml)?;
        options.validate()?;
        Ok(options)
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn init_buffer(&self) -> Duration {
        Duration::from_millis(self.init_buffer_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn with_timeslice(mut self, timeslice: Duration) -> Self {
        self.timeslice_ms = timeslice.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_look_ahead(mut self, look_ahead: usize) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    pub fn with_init_buffer(mut self, delay: Duration) -> Self {
        self.init_buffer_ms = delay.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_backward_steps(mut self, steps: u64) -> Self {
        self.max_backward_steps = steps;
        self
    }

    pub fn with_metadata_index(mut self, index: FeedIndex) -> Self {
        self.metadata_index = index;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check every option against its valid range.
    pub fn validate(&self) -> Result<()> {
        if self.timeslice_ms == 0 {
            return Err(PlayerError::configuration("timeslice_ms", "must be greater than zero"));
        }
        if self.look_ahead == 0 {
            return Err(PlayerError::configuration("look_ahead", "must be at least one index"));
        }
        if self.max_backward_steps == 0 {
            return Err(PlayerError::configuration("max_backward_steps", "must be at least one step"));
        }
        if self.mime_type.trim().is_empty() {
            return Err(PlayerError::configuration("mime_type", "must not be empty"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(PlayerError::configuration("fetch_timeout_ms", "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(PlayerError::configuration("retry.max_attempts", "must be at least one"));
        }
        if self.retry.initial_delay_ms > self.retry.max_delay_ms {
            return Err(PlayerError::configuration(
                "retry.initial_delay_ms",
                format!(
                    "initial delay {}ms exceeds max delay {}ms",
                    self.retry.initial_delay_ms, self.retry.max_delay_ms
                ),
            ));
        }
        Ok(())
    }
}
