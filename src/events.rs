//! Player event notifications
//!
//! Each signal is a `watch` channel of `bool`. Emitting a value equal to the
//! current one is a no-op, so subscribers only ever see real changes.
//! Dropping a subscription stream unsubscribes it.

use std::fmt;
use std::str::FromStr;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::PlayerError;

/// Named player signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerSignal {
    /// An initialization (play, seek or restart) is in flight
    LoadingPlaying,

    /// The sink clock is running
    IsPlaying,
}

impl PlayerSignal {
    pub const ALL: [PlayerSignal; 2] = [PlayerSignal::LoadingPlaying, PlayerSignal::IsPlaying];

    pub fn name(self) -> &'static str {
        match self {
            PlayerSignal::LoadingPlaying => "loadingPlaying",
            PlayerSignal::IsPlaying => "isPlaying",
        }
    }
}

impl fmt::Display for PlayerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PlayerSignal {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlayerSignal::ALL
            .into_iter()
            .find(|signal| signal.name() == s)
            .ok_or_else(|| PlayerError::configuration("signal", format!("unknown signal '{}'", s)))
    }
}

/// Deduplicating event surface of one player session.
#[derive(Debug)]
pub struct PlayerEvents {
    loading: watch::Sender<bool>,
    playing: watch::Sender<bool>,
}

impl Default for PlayerEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerEvents {
    pub fn new() -> Self {
        let (loading, _) = watch::channel(false);
        let (playing, _) = watch::channel(false);
        Self { loading, playing }
    }

    fn sender(&self, signal: PlayerSignal) -> &watch::Sender<bool> {
        match signal {
            PlayerSignal::LoadingPlaying => &self.loading,
            PlayerSignal::IsPlaying => &self.playing,
        }
    }

    /// Publish a value. Returns whether it changed the signal.
    pub fn emit(&self, signal: PlayerSignal, value: bool) -> bool {
        let changed = self.sender(signal).send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
        if changed {
            trace!("Signal {} -> {}", signal, value);
        }
        changed
    }

    /// Latest value of a signal.
    pub fn current(&self, signal: PlayerSignal) -> bool {
        *self.sender(signal).borrow()
    }

    /// Raw receiver for a signal.
    pub fn receiver(&self, signal: PlayerSignal) -> watch::Receiver<bool> {
        self.sender(signal).subscribe()
    }

    /// Stream of values for a signal, starting with the current one.
    ///
    /// The stream ends when the player session is dropped.
    pub fn subscribe(&self, signal: PlayerSignal) -> WatchStream<bool> {
        WatchStream::new(self.receiver(signal))
    }

    /// Number of live subscriptions to a signal.
    pub fn subscriber_count(&self, signal: PlayerSignal) -> usize {
        self.sender(signal).receiver_count()
    }
}
